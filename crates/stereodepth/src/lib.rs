//! High-level entry crate for the stereo depth pipeline.
//!
//! The workspace is split by concern; this crate is the public
//! compatibility boundary re-exporting the pieces most applications need:
//!
//! - **[`core`]**: math aliases, camera models, image buffers, the frame
//!   data model, errors, and configuration.
//! - **[`calib`]**: corner detection, the stereo solve, rectification, and
//!   calibration persistence.
//! - **[`pipeline`]**: capture, disparity/depth computation, segmentation,
//!   and the worker supervisor.
//!
//! A typical live loop:
//!
//! ```no_run
//! use stereodepth::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CalibrationStore::load_data(std::path::Path::new("data"))?;
//! let capture = DualCapture::new(
//!     SyntheticGrabber::uniform((840, 820)),
//!     CaptureConfig::default(),
//! )?;
//! let engine = StereoEngine::new(
//!     capture,
//!     Some(store),
//!     StereoMatchConfig::default(),
//!     DepthSegmenter::new(SegmenterConfig::default())?,
//! )?;
//!
//! let supervisor = PipelineSupervisor::new(SupervisorConfig::default())?;
//! supervisor.install_interrupt_handler()?;
//! supervisor.process_and_display(engine, PngSink::new("out")?, TerminalKeys)?;
//! # Ok(())
//! # }
//! ```

/// Core math, image, and frame types.
pub mod core {
    pub use stereo_core::*;
}

/// Calibration workflow, solve, rectification, and persistence.
pub mod calib {
    pub use stereo_calib::*;
}

/// Live pipeline: capture, compute, segment, supervise.
pub mod pipeline {
    pub use stereo_pipeline::*;
}

/// Convenient re-exports for common use cases.
pub mod prelude {
    pub use stereo_calib::{CalibrationStore, Calibrator, ChessboardGeometry};
    pub use stereo_core::{
        CameraIntrinsics, CaptureConfig, DepthMap, DisparityMap, FramePair, ObjectRegion,
        PipelineMessage, SegmenterConfig, StereoMatchConfig, SupervisorConfig,
    };
    pub use stereo_pipeline::{
        CommandGrabber, DepthSegmenter, DualCapture, FrameGrabber, PipelineSupervisor, PngSink,
        StereoEngine, SyntheticGrabber, TerminalKeys,
    };
}
