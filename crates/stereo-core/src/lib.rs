//! Core math, image, and frame types for the stereo depth pipeline.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Pt2`, `Mat3`, ...),
//! - camera models (pinhole intrinsics + Brown-Conrady radial distortion),
//! - owned grayscale image buffers ([`ImageU8`], [`ImageF32`]) with PNG I/O,
//! - the frame-level data model (`FramePair`, `DisparityMap`, `DepthMap`,
//!   `ObjectRegion`, `PipelineMessage`),
//! - the error taxonomy shared across the workspace,
//! - validated configuration structures,
//! - deterministic synthetic data generators used by tests.

/// Camera models: intrinsics and lens distortion.
pub mod camera;
/// Validated configuration structures.
pub mod config;
/// Error taxonomy for calibration, capture, and the live pipeline.
pub mod errors;
/// Owned grayscale image buffers and PNG I/O.
pub mod image;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Deterministic synthetic images and fields for tests.
pub mod synthetic;
/// Frame-level data model handed between pipeline stages.
pub mod types;

pub use camera::{CameraIntrinsics, RadialDistortion};
pub use config::{CaptureConfig, SegmenterConfig, StereoMatchConfig, SupervisorConfig};
pub use errors::{CalibrationError, CaptureError, ConfigError, PipelineError, Side};
pub use image::{ImageF32, ImageU8};
pub use math::{from_homogeneous, to_homogeneous, Iso3, Mat3, Pt2, Pt3, Real, Vec2, Vec3};
pub use types::{
    DepthMap, DisparityMap, FramePair, ObjectRegion, PipelineMessage, INVALID_DEPTH,
    INVALID_DISPARITY,
};
