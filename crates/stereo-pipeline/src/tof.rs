//! Time-of-flight collaborator boundary.
//!
//! Frame acquisition and depth reconstruction belong to the vendor SDK; the
//! core only consumes its per-frame depth/amplitude buffers and applies the
//! same segmentation algorithm and display convention as the stereo path.

use crate::segment::DepthSegmenter;
use std::time::Duration;
use stereo_core::{CaptureError, ImageF32, ImageU8, ObjectRegion};

/// One frame as delivered by the sensor SDK: physical depth, signal
/// amplitude, and the SDK's display-normalized depth rendition.
#[derive(Clone, Debug)]
pub struct TofFrame {
    pub depth: ImageF32,
    pub amplitude: ImageF32,
    pub depth_normalized: ImageU8,
}

/// Vendor acquisition boundary.
pub trait TofSource: Send {
    fn acquire(&mut self, timeout: Duration) -> Result<TofFrame, CaptureError>;
}

/// Cycles through pre-built frames; tests and dry runs.
pub struct SyntheticTofSource {
    frames: Vec<TofFrame>,
    cursor: usize,
}

impl SyntheticTofSource {
    pub fn new(frames: Vec<TofFrame>) -> Self {
        Self { frames, cursor: 0 }
    }
}

impl TofSource for SyntheticTofSource {
    fn acquire(&mut self, _timeout: Duration) -> Result<TofFrame, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::Timeout {
                camera_id: u32::MAX,
                waited_ms: 0,
            });
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Ok(frame)
    }
}

/// Segment a ToF frame exactly like a stereo frame: bands over the
/// normalized depth, per-region mean over the signal amplitude. Negative
/// amplitudes mark invalid sensor pixels.
pub fn segment_tof_frame(frame: &TofFrame, segmenter: &DepthSegmenter) -> Vec<ObjectRegion> {
    segmenter.process_disparity_image(&frame.depth_normalized, &frame.amplitude, &|v| v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::SegmenterConfig;

    #[test]
    fn tof_frame_segments_like_the_stereo_path() {
        let (w, h) = (60, 40);
        let mut depth_normalized = ImageU8::new(w, h, 0);
        let mut amplitude = ImageF32::new(w, h, -1.0);
        let mut depth = ImageF32::new(w, h, -1.0);
        for y in 8..28 {
            for x in 12..40 {
                depth_normalized.set(x, y, 180);
                amplitude.set(x, y, 412.5);
                depth.set(x, y, 1.75);
            }
        }
        let frame = TofFrame {
            depth,
            amplitude,
            depth_normalized,
        };

        let segmenter = DepthSegmenter::new(SegmenterConfig {
            thresholds: vec![0, 128, 255],
            kernel_size: 3,
            dilate_iterations: 1,
            erode_iterations: 1,
            min_region_pixels: 50,
            min_contour_area: 20,
        })
        .unwrap();

        let regions = segment_tof_frame(&frame, &segmenter);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].mean_distance, 412.5);
        assert_eq!(regions[0].band, 1);
    }

    #[test]
    fn empty_synthetic_source_fails_to_acquire() {
        let mut source = SyntheticTofSource::new(Vec::new());
        assert!(source.acquire(Duration::from_millis(1)).is_err());
    }
}
