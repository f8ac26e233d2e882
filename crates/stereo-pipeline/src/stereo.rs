//! Disparity and depth computation.
//!
//! Block matching runs disparity-major: for each candidate shift the
//! absolute-difference image is box-filtered through a summed-area table, so
//! the cost of one shift is independent of the window size. Per pixel we
//! track the best and second-best costs (excluding immediate neighbours of
//! the best shift) for the uniqueness test, plus the two neighbouring costs
//! of the winner for parabolic sub-pixel interpolation.

use crate::capture::{DualCapture, FrameGrabber};
use crate::segment::DepthSegmenter;
use stereo_calib::CalibrationStore;
use stereo_core::{
    DepthMap, DisparityMap, FramePair, ImageF32, ImageU8, ObjectRegion, PipelineError,
    PipelineMessage, Real, StereoMatchConfig, INVALID_DEPTH,
};

/// Summed-area table over per-pixel u8 differences.
struct CostIntegral {
    w: usize,
    sums: Vec<i64>,
}

impl CostIntegral {
    fn of_absdiff(left: &ImageU8, right: &ImageU8, d: usize) -> Self {
        let (w, h) = left.size();
        let stride = w + 1;
        let mut sums = vec![0i64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0i64;
            for x in 0..w {
                if x >= d {
                    row += (left.get(x, y) as i64 - right.get(x - d, y) as i64).abs();
                }
                sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + row;
            }
        }
        Self { w, sums }
    }

    fn of_gradient(img: &ImageU8) -> Self {
        let (w, h) = img.size();
        let stride = w + 1;
        let mut sums = vec![0i64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0i64;
            for x in 0..w {
                if x + 1 < w {
                    row += (img.get(x + 1, y) as i64 - img.get(x, y) as i64).abs();
                }
                sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + row;
            }
        }
        Self { w, sums }
    }

    #[inline]
    fn window(&self, x: usize, y: usize, r: usize) -> i64 {
        let stride = self.w + 1;
        let (x0, y0, x1, y1) = (x - r, y - r, x + r + 1, y + r + 1);
        self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0]
    }
}

/// Compute the disparity map of a rectified pair by SAD block matching.
///
/// Pixels that are textureless, ambiguous (uniqueness test), or out of the
/// searchable range are marked with the invalid sentinel rather than given a
/// spurious value.
pub fn compute_disparity(
    left: &ImageU8,
    right: &ImageU8,
    config: &StereoMatchConfig,
) -> DisparityMap {
    let (w, h) = left.size();
    let r = config.block_size / 2;
    let mut out = DisparityMap::invalid(w, h);
    if right.size() != (w, h) || w < config.block_size || h < config.block_size {
        return out;
    }

    let npix = w * h;
    let mut best = vec![f32::INFINITY; npix];
    let mut best_d = vec![-1i32; npix];
    let mut second = vec![f32::INFINITY; npix];
    let mut cost_below = vec![f32::INFINITY; npix]; // cost at best_d - 1
    let mut cost_above = vec![f32::INFINITY; npix]; // cost at best_d + 1
    let mut prev = vec![f32::INFINITY; npix];
    let mut cur = vec![f32::INFINITY; npix];

    for d in config.min_disparity..config.max_disparity {
        let integral = CostIntegral::of_absdiff(left, right, d);
        cur.fill(f32::INFINITY);
        let x_start = r.max(d + r);
        if x_start + r >= w {
            break; // no column can fit the window at this shift
        }
        for y in r..h - r {
            for x in x_start..w - r {
                let idx = y * w + x;
                let c = integral.window(x, y, r) as f32;
                cur[idx] = c;
                let di = d as i32;
                if c < best[idx] {
                    if best_d[idx] >= 0 && di - best_d[idx] > 1 && best[idx] < second[idx] {
                        second[idx] = best[idx];
                    }
                    best[idx] = c;
                    best_d[idx] = di;
                    cost_below[idx] = prev[idx];
                    cost_above[idx] = f32::INFINITY;
                } else {
                    if di == best_d[idx] + 1 {
                        cost_above[idx] = c;
                    }
                    if best_d[idx] >= 0 && di - best_d[idx] > 1 && c < second[idx] {
                        second[idx] = c;
                    }
                }
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let texture = CostIntegral::of_gradient(left);
    for y in r..h - r {
        for x in r..w - r {
            let idx = y * w + x;
            let bd = best_d[idx];
            if bd < 0 {
                continue;
            }
            if (texture.window(x, y, r) as f32) < config.texture_threshold {
                continue;
            }
            // The winner must beat the runner-up by the configured margin;
            // equal costs (periodic textures) are ambiguous.
            if second[idx].is_finite() && best[idx] * config.uniqueness_ratio >= second[idx] {
                continue;
            }
            let mut disp = bd as f32;
            let (lo, mid, hi) = (cost_below[idx], best[idx], cost_above[idx]);
            if lo.is_finite() && hi.is_finite() {
                let denom = lo - 2.0 * mid + hi;
                if denom > 1e-6 {
                    disp += (0.5 * (lo - hi) / denom).clamp(-0.5, 0.5);
                }
            }
            out.set(x, y, disp.max(0.0));
        }
    }
    out
}

/// Convert disparity to physical depth: `depth = baseline * focal / d`.
///
/// Zero and invalid disparities yield the invalid-depth sentinel; the
/// division can never see zero and the output is never NaN or infinite.
pub fn disparity_to_depth(disp: &DisparityMap, baseline: Real, focal: Real) -> DepthMap {
    let (w, h) = (disp.width(), disp.height());
    let scale = baseline * focal;
    let mut values = ImageF32::new(w, h, INVALID_DEPTH);
    for y in 0..h {
        for x in 0..w {
            let d = disp.get(x, y);
            if DisparityMap::is_valid(d) && d > 0.0 {
                values.set(x, y, (scale / d as Real) as f32);
            }
        }
    }
    DepthMap::new(values)
}

/// The capture→rectify→disparity→depth→segment unit of work.
#[derive(Debug)]
pub struct StereoEngine<G: FrameGrabber> {
    capture: DualCapture<G>,
    store: CalibrationStore,
    config: StereoMatchConfig,
    segmenter: DepthSegmenter,
}

impl<G: FrameGrabber> StereoEngine<G> {
    /// Build the engine; `store` is the loaded calibration, and its absence
    /// is fatal before the live loop starts.
    pub fn new(
        capture: DualCapture<G>,
        store: Option<CalibrationStore>,
        config: StereoMatchConfig,
        segmenter: DepthSegmenter,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let store = store.ok_or(PipelineError::NotCalibrated)?;
        Ok(Self {
            capture,
            store,
            config,
            segmenter,
        })
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Acquire one pair and rectify it with the stored maps.
    pub fn stereo_taking(&mut self) -> Result<FramePair, PipelineError> {
        let pair = self.capture.capture_pair()?;
        Ok(self.store.rectify(&pair)?)
    }

    /// Disparity of a rectified pair.
    pub fn depth_map_calcul(&self, pair: &FramePair) -> DisparityMap {
        compute_disparity(&pair.left, &pair.right, &self.config)
    }

    /// Depth of a disparity map, using the calibrated baseline and focal
    /// length.
    pub fn depth_calcul(&self, disparity: &DisparityMap) -> DepthMap {
        let p = self.store.params();
        disparity_to_depth(disparity, p.baseline(), p.focal())
    }

    /// Segment the frame into objects with distances.
    pub fn process_stereo(
        &self,
        disparity: &DisparityMap,
        depth: &DepthMap,
    ) -> Vec<ObjectRegion> {
        self.segmenter.segment_depth(disparity, depth)
    }

    /// Run the full unit of work and assemble the frame's message.
    pub fn capture_and_compute(&mut self) -> Result<PipelineMessage, PipelineError> {
        let pair = self.stereo_taking()?;
        let disparity = self.depth_map_calcul(&pair);
        let depth = self.depth_calcul(&disparity);
        let regions = self.process_stereo(&disparity, &depth);
        Ok(PipelineMessage {
            seq: pair.seq,
            disparity,
            depth,
            regions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::synthetic::{noise_texture, shifted_pair};
    use stereo_core::INVALID_DISPARITY;

    fn small_match_config() -> StereoMatchConfig {
        StereoMatchConfig {
            block_size: 7,
            min_disparity: 0,
            max_disparity: 16,
            uniqueness_ratio: 1.15,
            texture_threshold: 16.0,
        }
    }

    #[test]
    fn depth_formula_is_exact_where_valid() {
        let mut disp = DisparityMap::invalid(4, 1);
        disp.set(0, 0, 2.0);
        disp.set(1, 0, 0.0); // valid disparity, undefined depth
        disp.set(2, 0, 60.0);
        // (3, 0) stays at the invalid sentinel.
        let depth = disparity_to_depth(&disp, 0.06, 1300.0);
        assert_eq!(depth.get(0, 0), (0.06 * 1300.0 / 2.0) as f32);
        assert_eq!(depth.get(1, 0), INVALID_DEPTH);
        assert_eq!(depth.get(2, 0), (0.06 * 1300.0 / 60.0) as f32);
        assert_eq!(depth.get(3, 0), INVALID_DEPTH);
        for &v in depth.values().as_slice() {
            assert!(v.is_finite(), "depth must never be NaN or infinite");
        }
    }

    #[test]
    fn block_matcher_recovers_constant_shift() {
        let base = noise_texture(64, 48, 11);
        let (left, right) = shifted_pair(&base, 6);
        let disp = compute_disparity(&left, &right, &small_match_config());

        let mut checked = 0;
        for y in 10..38 {
            for x in 20..50 {
                let v = disp.get(x, y);
                assert!(DisparityMap::is_valid(v), "pixel ({x},{y}) invalid");
                assert!((v - 6.0).abs() < 0.5, "pixel ({x},{y}) disparity {v}");
                checked += 1;
            }
        }
        assert!(checked > 500);
    }

    #[test]
    fn textureless_pair_yields_no_matches() {
        let flat = ImageU8::new(64, 48, 100);
        let disp = compute_disparity(&flat, &flat, &small_match_config());
        for &v in disp.values().as_slice() {
            assert_eq!(v, INVALID_DISPARITY);
        }
    }

    #[test]
    fn periodic_pattern_is_rejected_as_ambiguous() {
        // Vertical stripes with period 8: the true shift and shift ± 8 give
        // identical costs, so the uniqueness test must refuse to choose.
        let mut base = ImageU8::new(64, 48, 50);
        for y in 0..48 {
            for x in 0..64 {
                if (x / 4) % 2 == 0 {
                    base.set(x, y, 200);
                }
            }
        }
        let (left, right) = shifted_pair(&base, 6);
        let disp = compute_disparity(&left, &right, &small_match_config());
        for y in 15..35 {
            for x in 25..45 {
                assert!(
                    !DisparityMap::is_valid(disp.get(x, y)),
                    "ambiguous pixel ({x},{y}) got disparity {}",
                    disp.get(x, y)
                );
            }
        }
    }

    #[test]
    fn mismatched_sizes_yield_invalid_map() {
        let left = ImageU8::new(64, 48, 0);
        let right = ImageU8::new(32, 48, 0);
        let disp = compute_disparity(&left, &right, &small_match_config());
        assert!(disp.values().as_slice().iter().all(|&v| v == INVALID_DISPARITY));
    }
}
