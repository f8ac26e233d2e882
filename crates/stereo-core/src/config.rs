//! Validated configuration structures.
//!
//! Every tunable is injected at construction and never mutated afterwards.
//! Defaults are the constants the deployed rig ships with; they are starting
//! points and expect re-tuning against the target hardware.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Block-matching parameters for disparity computation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StereoMatchConfig {
    /// Side length of the square correlation window (odd).
    pub block_size: usize,
    /// Smallest disparity searched, inclusive.
    pub min_disparity: usize,
    /// Largest disparity searched, exclusive.
    pub max_disparity: usize,
    /// A match is kept only if `best_cost * uniqueness_ratio < second_best`.
    pub uniqueness_ratio: f32,
    /// Minimum absolute-deviation sum inside the window; flatter windows are
    /// marked invalid instead of matched.
    pub texture_threshold: f32,
}

impl Default for StereoMatchConfig {
    fn default() -> Self {
        Self {
            block_size: 15,
            min_disparity: 0,
            max_disparity: 128,
            uniqueness_ratio: 1.15,
            texture_threshold: 16.0,
        }
    }
}

impl StereoMatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size % 2 == 0 || self.block_size == 0 {
            return Err(ConfigError(format!(
                "block_size must be odd and positive, got {}",
                self.block_size
            )));
        }
        if self.max_disparity <= self.min_disparity {
            return Err(ConfigError(format!(
                "max_disparity {} must exceed min_disparity {}",
                self.max_disparity, self.min_disparity
            )));
        }
        if self.uniqueness_ratio < 1.0 {
            return Err(ConfigError(format!(
                "uniqueness_ratio must be >= 1.0, got {}",
                self.uniqueness_ratio
            )));
        }
        Ok(())
    }
}

/// Band thresholds and cleanup parameters for depth-map segmentation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Ascending thresholds over the normalized disparity; each consecutive
    /// pair forms one band.
    pub thresholds: Vec<u8>,
    /// Side length of the square morphology kernel (odd).
    pub kernel_size: usize,
    /// Dilation passes applied before erosion (closing).
    pub dilate_iterations: usize,
    /// Erosion passes applied after dilation.
    pub erode_iterations: usize,
    /// Bands with fewer in-range pixels than this are skipped outright.
    pub min_region_pixels: usize,
    /// Connected regions below this pixel area are discarded as noise.
    pub min_contour_area: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![50, 100, 200, 255],
            kernel_size: 5,
            dilate_iterations: 1,
            erode_iterations: 2,
            min_region_pixels: 15_000,
            min_contour_area: 10,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.len() < 2 {
            return Err(ConfigError(
                "thresholds needs at least two entries to form a band".into(),
            ));
        }
        if !self.thresholds.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError(format!(
                "thresholds must be strictly ascending: {:?}",
                self.thresholds
            )));
        }
        if self.kernel_size % 2 == 0 || self.kernel_size == 0 {
            return Err(ConfigError(format!(
                "kernel_size must be odd and positive, got {}",
                self.kernel_size
            )));
        }
        Ok(())
    }

    /// Consecutive threshold pairs, one per band.
    pub fn bands(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.thresholds.windows(2).map(|w| (w[0], w[1]))
    }
}

/// Camera identifiers and retry policy for dual capture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub left_camera: u32,
    pub right_camera: u32,
    /// Expected frame resolution; frames of any other size are rejected.
    pub image_size: (usize, usize),
    /// Bounded wait for a single frame.
    pub capture_timeout: Duration,
    /// Rejected pairs are retried up to this many attempts.
    pub max_attempts: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            left_camera: 0,
            right_camera: 1,
            image_size: (840, 820),
            capture_timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.left_camera == self.right_camera {
            return Err(ConfigError(format!(
                "left and right camera ids must differ, both are {}",
                self.left_camera
            )));
        }
        let (w, h) = self.image_size;
        if w == 0 || h == 0 {
            return Err(ConfigError("image_size must be non-zero".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Queue bounds, shutdown grace, and scratch location for the supervisor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Capacity of the producer→consumer queue; overflow evicts the oldest.
    pub queue_capacity: usize,
    /// How long workers and tracked children get to exit after the stop
    /// signal before being force-stopped.
    pub grace_period: Duration,
    /// Scratch directory for transient capture files and the PID registry.
    pub scratch_dir: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4,
            grace_period: Duration::from_secs(2),
            scratch_dir: std::env::temp_dir().join("stereodepth"),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError("queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        StereoMatchConfig::default().validate().unwrap();
        SegmenterConfig::default().validate().unwrap();
        CaptureConfig::default().validate().unwrap();
        SupervisorConfig::default().validate().unwrap();
    }

    #[test]
    fn even_block_size_rejected() {
        let cfg = StereoMatchConfig {
            block_size: 8,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn descending_thresholds_rejected() {
        let cfg = SegmenterConfig {
            thresholds: vec![100, 50],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bands_pair_consecutive_thresholds() {
        let cfg = SegmenterConfig::default();
        let bands: Vec<_> = cfg.bands().collect();
        assert_eq!(bands, vec![(50, 100), (100, 200), (200, 255)]);
    }
}
