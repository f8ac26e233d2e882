//! Depth-map segmentation into distinct objects.
//!
//! The segmenter partitions the normalized disparity into configured bands,
//! cleans each band mask with a morphological closing, extracts connected
//! regions and their outer contours, and reports the mean of the measure
//! image (depth for stereo, amplitude for time-of-flight) per region.

use crate::mask::{connected_components, dilate, erode, in_range, trace_boundary, Component};
use stereo_core::{
    ConfigError, DepthMap, DisparityMap, ImageF32, ImageU8, ObjectRegion, SegmenterConfig,
};

#[derive(Clone, Debug)]
pub struct DepthSegmenter {
    config: SegmenterConfig,
}

impl DepthSegmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Morphological closing: dilation first so thin real objects are not
    /// fragmented, then erosion to shed the speckle the dilation grew.
    pub fn apply_morphological_operations(&self, mask: &ImageU8) -> ImageU8 {
        let dilated = dilate(mask, self.config.kernel_size, self.config.dilate_iterations);
        erode(&dilated, self.config.kernel_size, self.config.erode_iterations)
    }

    /// Mean of `measure` over the region's pixels, skipping invalid ones.
    /// `None` when no pixel of the region carries a valid measure.
    pub fn calculate_mean_amplitude(
        &self,
        component: &Component,
        measure: &ImageF32,
        valid: &dyn Fn(f32) -> bool,
    ) -> Option<f64> {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for &(x, y) in &component.pixels {
            let v = measure.get(x as usize, y as usize);
            if valid(v) {
                sum += v as f64;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Segment one frame: band masks over `normalized`, closing, contour
    /// extraction, and per-region mean of `measure`.
    ///
    /// `normalized` uses 0 for invalid pixels; bands never include them.
    pub fn process_disparity_image(
        &self,
        normalized: &ImageU8,
        measure: &ImageF32,
        valid: &dyn Fn(f32) -> bool,
    ) -> Vec<ObjectRegion> {
        let mut regions = Vec::new();
        for (band, (lo, hi)) in self.config.bands().enumerate() {
            let mask = in_range(normalized, lo.max(1), hi);
            let in_band = mask.count_nonzero();
            if in_band < self.config.min_region_pixels {
                log::debug!(
                    "band {band} ({lo}..{hi}) rejected: {in_band} pixels below minimum {}",
                    self.config.min_region_pixels
                );
                continue;
            }

            let cleaned = self.apply_morphological_operations(&mask);
            for component in connected_components(&cleaned) {
                if component.area() < self.config.min_contour_area {
                    continue;
                }
                let Some(mean_distance) = self.calculate_mean_amplitude(&component, measure, valid)
                else {
                    // A region with no valid measure pixels has no defined
                    // distance; drop it.
                    continue;
                };
                let contour = trace_boundary(&cleaned, component.anchor);
                regions.push(ObjectRegion {
                    band,
                    band_range: (lo, hi),
                    contour,
                    area: component.area(),
                    mean_distance,
                });
            }
            log::debug!(
                "band {band} ({lo}..{hi}): {in_band} pixels, {} region(s) so far",
                regions.len()
            );
        }
        regions
    }

    /// Stereo entry point: bands over the normalized disparity, means over
    /// the depth map.
    pub fn segment_depth(&self, disparity: &DisparityMap, depth: &DepthMap) -> Vec<ObjectRegion> {
        self.process_disparity_image(&disparity.normalized(), depth.values(), &DepthMap::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SegmenterConfig {
        SegmenterConfig {
            thresholds: vec![0, 128, 255],
            kernel_size: 3,
            dilate_iterations: 1,
            erode_iterations: 1,
            min_region_pixels: 20,
            min_contour_area: 10,
        }
    }

    #[test]
    fn all_zero_mask_produces_no_regions() {
        let seg = DepthSegmenter::new(test_config()).unwrap();
        let cleaned = seg.apply_morphological_operations(&ImageU8::new(60, 40, 0));
        assert_eq!(cleaned.count_nonzero(), 0);

        let normalized = ImageU8::new(60, 40, 0);
        let measure = ImageF32::new(60, 40, 0.0);
        let regions = seg.process_disparity_image(&normalized, &measure, &|v| v > 0.0);
        assert!(regions.is_empty());
    }

    #[test]
    fn mean_amplitude_over_constant_region_is_exact() {
        let seg = DepthSegmenter::new(test_config()).unwrap();
        let mut normalized = ImageU8::new(60, 40, 0);
        let mut measure = ImageF32::new(60, 40, 0.0);
        for y in 10..25 {
            for x in 10..30 {
                normalized.set(x, y, 200);
                measure.set(x, y, 2.5);
            }
        }
        let regions = seg.process_disparity_image(&normalized, &measure, &|v| v > 0.0);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].mean_distance, 2.5);
        assert_eq!(regions[0].band, 1);
        assert_eq!(regions[0].band_range, (128, 255));
    }

    #[test]
    fn region_without_valid_measure_is_dropped() {
        let seg = DepthSegmenter::new(test_config()).unwrap();
        let mut normalized = ImageU8::new(60, 40, 0);
        for y in 10..25 {
            for x in 10..30 {
                normalized.set(x, y, 60);
            }
        }
        // Measure invalid everywhere.
        let measure = ImageF32::new(60, 40, -1.0);
        let regions = seg.process_disparity_image(&normalized, &measure, &|v| v > 0.0);
        assert!(regions.is_empty());
    }

    #[test]
    fn sparse_band_is_skipped() {
        let seg = DepthSegmenter::new(test_config()).unwrap();
        let mut normalized = ImageU8::new(60, 40, 0);
        let mut measure = ImageF32::new(60, 40, 0.0);
        // Only 6 pixels in band 0, below min_region_pixels = 20.
        for x in 10..16 {
            normalized.set(x, 10, 60);
            measure.set(x, 10, 1.0);
        }
        let regions = seg.process_disparity_image(&normalized, &measure, &|v| v > 0.0);
        assert!(regions.is_empty());
    }

    #[test]
    fn small_regions_filtered_as_noise() {
        let cfg = SegmenterConfig {
            min_region_pixels: 20,
            min_contour_area: 50,
            ..test_config()
        };
        let seg = DepthSegmenter::new(cfg).unwrap();
        let mut normalized = ImageU8::new(60, 40, 0);
        let mut measure = ImageF32::new(60, 40, 0.0);
        // 5x5 after closing stays 25 pixels, below min_contour_area = 50.
        for y in 10..15 {
            for x in 10..15 {
                normalized.set(x, y, 60);
                measure.set(x, y, 1.0);
            }
        }
        let regions = seg.process_disparity_image(&normalized, &measure, &|v| v > 0.0);
        assert!(regions.is_empty());
    }
}
