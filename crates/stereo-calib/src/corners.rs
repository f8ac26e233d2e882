//! Inner-corner detection on checkerboard images.
//!
//! Detection runs in three passes: a quadrant-contrast response that fires
//! only on saddle-type corners (two dark squares meeting two light squares),
//! non-maximum suppression with sub-pixel refinement, and a grid-ordering
//! step that maps the detected cloud onto the expected `(rows-1) x (cols-1)`
//! lattice via the four extremal corners. Anything short of the full lattice
//! is a [`CalibrationError::CornerDetectionFailure`]; partial grids are never
//! returned.

use crate::homography::{apply_homography, dlt_homography};
use crate::target::ChessboardGeometry;
use stereo_core::{CalibrationError, ImageU8, Pt2, Real, Side};

/// Tunables for the corner response and suppression passes.
#[derive(Clone, Copy, Debug)]
pub struct CornerDetectOptions {
    /// Half-size of the quadrant windows sampled around a candidate.
    pub quadrant_radius: usize,
    /// Minimum saddle response (gray levels) to consider a candidate.
    pub response_threshold: f32,
    /// Candidates closer than this to a stronger one are suppressed.
    pub nms_radius: usize,
}

impl Default for CornerDetectOptions {
    fn default() -> Self {
        Self {
            quadrant_radius: 5,
            response_threshold: 40.0,
            nms_radius: 7,
        }
    }
}

/// Summed-area table for O(1) box sums.
struct Integral {
    w: usize,
    sums: Vec<i64>,
}

impl Integral {
    fn build(img: &ImageU8) -> Self {
        let (w, h) = img.size();
        let stride = w + 1;
        let mut sums = vec![0i64; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0i64;
            for x in 0..w {
                row_sum += img.get(x, y) as i64;
                sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + row_sum;
            }
        }
        Self { w, sums }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> i64 {
        let stride = self.w + 1;
        self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0]
    }
}

/// Saddle response at `(x, y)`: diagonal quadrants agree, adjacent quadrants
/// disagree. Edges and uniform patches both score near zero.
fn saddle_response(integral: &Integral, x: usize, y: usize, r: usize) -> f32 {
    let area = (r * r) as f32;
    let nw = integral.box_sum(x - r, y - r, x, y) as f32 / area;
    let ne = integral.box_sum(x + 1, y - r, x + r + 1, y) as f32 / area;
    let sw = integral.box_sum(x - r, y + 1, x, y + r + 1) as f32 / area;
    let se = integral.box_sum(x + 1, y + 1, x + r + 1, y + r + 1) as f32 / area;
    ((nw + se - ne - sw).abs() - (nw - se).abs() - (ne - sw).abs()) / 2.0
}

fn response_map(img: &ImageU8, r: usize) -> Vec<f32> {
    let (w, h) = img.size();
    let integral = Integral::build(img);
    let mut resp = vec![0.0f32; w * h];
    for y in r..h - r - 1 {
        for x in r..w - r - 1 {
            resp[y * w + x] = saddle_response(&integral, x, y, r);
        }
    }
    resp
}

/// Quadratic sub-pixel peak refinement along one axis.
fn parabolic_offset(lo: f32, mid: f32, hi: f32) -> Real {
    let denom = lo - 2.0 * mid + hi;
    if denom.abs() < 1e-6 {
        return 0.0;
    }
    (0.5 * (lo - hi) / denom).clamp(-0.5, 0.5) as Real
}

fn fail(side: Side, reason: String) -> CalibrationError {
    CalibrationError::CornerDetectionFailure { side, reason }
}

/// Detect the full inner-corner grid of `geometry` in `img`.
///
/// Returns the corners row-major (top row first, left to right), matching
/// [`ChessboardGeometry::object_points_2d`]. Assumes the board is fully
/// visible and not rotated past ±45° in the image plane.
pub fn detect_inner_corners(
    img: &ImageU8,
    geometry: &ChessboardGeometry,
    opts: &CornerDetectOptions,
    side: Side,
) -> Result<Vec<Pt2>, CalibrationError> {
    let (w, h) = img.size();
    let r = opts.quadrant_radius;
    if w < 4 * r || h < 4 * r {
        return Err(fail(side, format!("image {w}x{h} too small for detection")));
    }

    let resp = response_map(img, r);

    // Local maxima above the response threshold.
    let mut candidates: Vec<(usize, usize, f32)> = Vec::new();
    for y in r + 1..h - r - 2 {
        for x in r + 1..w - r - 2 {
            let v = resp[y * w + x];
            if v < opts.response_threshold {
                continue;
            }
            let mut is_peak = true;
            'scan: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let n = resp[(y as i64 + dy) as usize * w + (x as i64 + dx) as usize];
                    if n > v {
                        is_peak = false;
                        break 'scan;
                    }
                }
            }
            if is_peak {
                candidates.push((x, y, v));
            }
        }
    }

    // Greedy suppression, strongest first.
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    let min_d2 = (opts.nms_radius * opts.nms_radius) as i64;
    let mut kept: Vec<(usize, usize, f32)> = Vec::new();
    for (x, y, v) in candidates {
        let clear = kept.iter().all(|&(kx, ky, _)| {
            let dx = kx as i64 - x as i64;
            let dy = ky as i64 - y as i64;
            dx * dx + dy * dy > min_d2
        });
        if clear {
            kept.push((x, y, v));
        }
    }

    let expected = geometry.corner_count();
    if kept.len() < expected {
        return Err(fail(
            side,
            format!("found {} of {expected} corners", kept.len()),
        ));
    }
    kept.truncate(expected);

    // Sub-pixel refinement on the response surface.
    let points: Vec<Pt2> = kept
        .iter()
        .map(|&(x, y, _)| {
            let at = |xx: usize, yy: usize| resp[yy * w + xx];
            let dx = parabolic_offset(at(x - 1, y), at(x, y), at(x + 1, y));
            let dy = parabolic_offset(at(x, y - 1), at(x, y), at(x, y + 1));
            Pt2::new(x as Real + dx, y as Real + dy)
        })
        .collect();

    order_grid(&points, geometry.inner_cols(), geometry.inner_rows())
        .map_err(|reason| fail(side, reason))
}

/// Order an unstructured corner cloud into a row-major `nx x ny` lattice.
///
/// The four extremal points anchor a lattice→image homography; every lattice
/// node must then claim a distinct detected corner within a spacing gate.
fn order_grid(points: &[Pt2], nx: usize, ny: usize) -> Result<Vec<Pt2>, String> {
    let argmin = |f: &dyn Fn(&Pt2) -> Real| {
        points
            .iter()
            .enumerate()
            .min_by(|a, b| f(a.1).total_cmp(&f(b.1)))
            .map(|(i, _)| i)
            .expect("non-empty point set")
    };
    let tl = argmin(&|p: &Pt2| p.x + p.y);
    let br = argmin(&|p: &Pt2| -(p.x + p.y));
    let tr = argmin(&|p: &Pt2| p.y - p.x);
    let bl = argmin(&|p: &Pt2| p.x - p.y);

    let anchors = [tl, tr, br, bl];
    if anchors.iter().collect::<std::collections::HashSet<_>>().len() != 4 {
        return Err("extremal board corners are ambiguous".into());
    }

    let lattice = [
        Pt2::new(0.0, 0.0),
        Pt2::new(nx as Real - 1.0, 0.0),
        Pt2::new(nx as Real - 1.0, ny as Real - 1.0),
        Pt2::new(0.0, ny as Real - 1.0),
    ];
    let image: Vec<Pt2> = anchors.iter().map(|&i| points[i]).collect();
    let h = dlt_homography(&lattice, &image).map_err(|e| e.to_string())?;

    let step_x = (apply_homography(&h, &Pt2::new(1.0, 0.0)) - apply_homography(&h, &lattice[0]))
        .norm();
    let step_y = (apply_homography(&h, &Pt2::new(0.0, 1.0)) - apply_homography(&h, &lattice[0]))
        .norm();
    let gate = 0.4 * step_x.min(step_y);

    let mut used = vec![false; points.len()];
    let mut ordered = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let predicted = apply_homography(&h, &Pt2::new(i as Real, j as Real));
            let mut best: Option<(usize, Real)> = None;
            for (idx, p) in points.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                let d = (p - predicted).norm();
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((idx, d));
                }
            }
            match best {
                Some((idx, d)) if d <= gate => {
                    used[idx] = true;
                    ordered.push(points[idx]);
                }
                _ => {
                    return Err(format!(
                        "no corner near lattice node ({i}, {j}); grid incomplete or warped"
                    ))
                }
            }
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::synthetic::{board_placement, inner_corner_pixels, warped_checkerboard};
    use stereo_core::Mat3;

    fn detect(h: &Mat3, rows: usize, cols: usize) -> Vec<Pt2> {
        let geometry = ChessboardGeometry::new(rows, cols, 1.0).unwrap();
        let img = warped_checkerboard(rows, cols, 1.0, h, 420, 360);
        detect_inner_corners(&img, &geometry, &CornerDetectOptions::default(), Side::Left)
            .expect("full grid should be detected")
    }

    #[test]
    fn full_grid_detected_on_axis_aligned_board() {
        let (rows, cols) = (7, 10);
        let h = board_placement((40.0, 40.0), 30.0);
        let corners = detect(&h, rows, cols);
        assert_eq!(corners.len(), (rows - 1) * (cols - 1));

        let truth = inner_corner_pixels(rows, cols, 1.0, &h);
        for (est, gt) in corners.iter().zip(&truth) {
            assert!((est - gt).norm() < 1.0, "corner {est} vs truth {gt}");
        }
    }

    #[test]
    fn full_grid_detected_under_projective_warp() {
        let (rows, cols) = (7, 10);
        let mut h = board_placement((50.0, 60.0), 28.0);
        h[(0, 1)] = 3.0; // shear
        h[(2, 0)] = 2e-4; // perspective
        let corners = detect(&h, rows, cols);
        let truth = inner_corner_pixels(rows, cols, 1.0, &h);
        for (est, gt) in corners.iter().zip(&truth) {
            assert!((est - gt).norm() < 1.5, "corner {est} vs truth {gt}");
        }
    }

    #[test]
    fn partial_board_is_rejected() {
        let (rows, cols) = (7, 10);
        let geometry = ChessboardGeometry::new(rows, cols, 1.0).unwrap();
        // Board extends past the right image edge; some corners are cut off.
        let h = board_placement((300.0, 40.0), 30.0);
        let img = warped_checkerboard(rows, cols, 1.0, &h, 420, 360);
        let err =
            detect_inner_corners(&img, &geometry, &CornerDetectOptions::default(), Side::Right)
                .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::CornerDetectionFailure { side: Side::Right, .. }
        ));
    }

    #[test]
    fn blank_image_is_rejected() {
        let geometry = ChessboardGeometry::new(7, 10, 1.0).unwrap();
        let img = ImageU8::new(420, 360, 128);
        assert!(detect_inner_corners(
            &img,
            &geometry,
            &CornerDetectOptions::default(),
            Side::Left
        )
        .is_err());
    }
}
