//! Stereo camera calibration.
//!
//! The solve follows the classic pipeline: detect the calibration-pattern
//! corner grid per view ([`corners`]), estimate per-view plane homographies
//! ([`homography`]), initialize intrinsics with Zhang's closed form
//! ([`zhang`]) and per-view poses from the homography decomposition
//! ([`planar_pose`]), average the per-view relative poses into the stereo
//! extrinsics, then jointly refine everything with Levenberg-Marquardt over
//! the reprojection residuals ([`refine`]). [`rectify`] derives the
//! row-aligning rotations and pixel remap tables, and [`store`] persists the
//! whole result for the live loop.

/// The interactive calibration workflow.
pub mod calibrator;
/// Inner-corner detection on checkerboard images.
pub mod corners;
/// Plane homography estimation (DLT).
pub mod homography;
/// Pose-from-homography decomposition.
pub mod planar_pose;
/// Point projection through pose, distortion, and intrinsics.
pub mod projection;
/// Nonlinear joint refinement of the stereo rig.
pub mod refine;
/// Rectification geometry and remap tables.
pub mod rectify;
/// Persistence of solved calibrations.
pub mod store;
/// Calibration-pattern geometry.
pub mod target;
/// Zhang's closed-form intrinsics initialization.
pub mod zhang;

pub use calibrator::{Calibrator, CornerPair};
pub use rectify::{RectificationMaps, RectifiedGeometry};
pub use store::{CalibrationParameters, CalibrationStore};
pub use target::ChessboardGeometry;
