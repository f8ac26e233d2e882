//! Error taxonomy shared across the workspace.
//!
//! Calibration-time failures are recoverable by the interactive operator
//! (skip the pair, capture another); live-loop failures are either fatal at
//! startup (`NotCalibrated`, `DeviceLocked`) or logged-and-skipped per frame.

use std::path::PathBuf;
use thiserror::Error;

/// Which camera of the stereo pair an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Failures while solving or loading camera calibration.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration pattern not fully visible in {side} image: {reason}")]
    CornerDetectionFailure { side: Side, reason: String },

    #[error("need at least {required} valid calibration pairs, got {got}")]
    InsufficientSamples { required: usize, got: usize },

    #[error("calibration data missing: {}", .0.display())]
    Missing(PathBuf),

    #[error("calibration data corrupt: {0}")]
    Corrupt(String),

    #[error("degenerate calibration geometry: {0}")]
    Degenerate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures while acquiring frames from the cameras.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera {camera_id}: no frame within {waited_ms} ms")]
    Timeout { camera_id: u32, waited_ms: u64 },

    #[error("gave up after {attempts} rejected capture attempts")]
    Exhausted { attempts: usize },

    #[error("invalid frame pair: {0}")]
    InvalidPair(String),

    #[error("camera device held by process {pid}; reap it before starting")]
    DeviceLocked { pid: i32 },

    #[error("cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejected configuration values.
#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Failures of the live capture→compute→display loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no calibration loaded; run the calibration process first")]
    NotCalibrated,

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
