//! Deterministic synthetic images and fields for tests.
//!
//! Everything here is reproducible from its arguments alone; no randomness,
//! so failures replay exactly.

use crate::image::ImageU8;
use crate::math::{Mat3, Pt2, Real};
use crate::types::DisparityMap;

/// Shade of the light checkerboard squares and the surrounding margin.
const BOARD_LIGHT: u8 = 230;
/// Shade of the dark checkerboard squares.
const BOARD_DARK: u8 = 25;

/// Render a checkerboard of `rows x cols` squares seen through a plane
/// homography `h` (board plane in units of `square_size` → pixels).
///
/// Pixels outside the board take the margin shade, so the board's outer
/// edge never produces inner-corner responses.
pub fn warped_checkerboard(
    rows: usize,
    cols: usize,
    square_size: Real,
    h: &Mat3,
    width: usize,
    height: usize,
) -> ImageU8 {
    let h_inv = h.try_inverse().expect("homography must be invertible");
    let mut img = ImageU8::new(width, height, BOARD_LIGHT);
    for y in 0..height {
        for x in 0..width {
            let p = h_inv * crate::math::Vec3::new(x as Real + 0.5, y as Real + 0.5, 1.0);
            if p.z.abs() < 1e-12 {
                continue;
            }
            let bx = p.x / p.z / square_size;
            let by = p.y / p.z / square_size;
            if bx < 0.0 || by < 0.0 || bx >= cols as Real || by >= rows as Real {
                continue;
            }
            let parity = (bx.floor() as i64 + by.floor() as i64) % 2;
            img.set(x, y, if parity == 0 { BOARD_DARK } else { BOARD_LIGHT });
        }
    }
    img
}

/// Ground-truth pixel positions of the `(rows-1) x (cols-1)` inner corners,
/// row-major, under the same homography as [`warped_checkerboard`].
pub fn inner_corner_pixels(rows: usize, cols: usize, square_size: Real, h: &Mat3) -> Vec<Pt2> {
    let mut out = Vec::with_capacity((rows - 1) * (cols - 1));
    for j in 1..rows {
        for i in 1..cols {
            let v = h * crate::math::Vec3::new(
                i as Real * square_size,
                j as Real * square_size,
                1.0,
            );
            out.push(Pt2::new(v.x / v.z, v.y / v.z));
        }
    }
    out
}

/// Axis-aligned homography placing the board at `origin` with `scale` pixels
/// per board unit.
pub fn board_placement(origin: (Real, Real), scale: Real) -> Mat3 {
    Mat3::new(scale, 0.0, origin.0, 0.0, scale, origin.1, 0.0, 0.0, 1.0)
}

/// Deterministic high-frequency texture; integer hash, no RNG state.
pub fn noise_texture(width: usize, height: usize, seed: u32) -> ImageU8 {
    let mut img = ImageU8::new(width, height, 0);
    for y in 0..height {
        for x in 0..width {
            let mut v = (x as u32).wrapping_mul(0x9E37_79B9)
                ^ (y as u32).wrapping_mul(0x85EB_CA6B)
                ^ seed.wrapping_mul(0xC2B2_AE35);
            v ^= v >> 15;
            v = v.wrapping_mul(0x2C1B_3C6D);
            v ^= v >> 12;
            img.set(x, y, (v & 0xFF) as u8);
        }
    }
    img
}

/// Build a rectified stereo pair where every pixel of `left` appears in the
/// right frame shifted by the constant disparity `d`: `right(x) = left(x+d)`.
pub fn shifted_pair(left: &ImageU8, d: usize) -> (ImageU8, ImageU8) {
    let (w, h) = left.size();
    let mut right = ImageU8::new(w, h, 0);
    for y in 0..h {
        for x in 0..w {
            let src = (x + d).min(w - 1);
            right.set(x, y, left.get(src, y));
        }
    }
    (left.clone(), right)
}

/// Axis-aligned rectangle with a constant disparity value.
#[derive(Clone, Copy, Debug)]
pub struct Plateau {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
    pub value: f32,
}

/// Disparity field that is invalid everywhere except the given plateaus.
pub fn plateau_disparity(width: usize, height: usize, plateaus: &[Plateau]) -> DisparityMap {
    let mut disp = DisparityMap::invalid(width, height);
    for p in plateaus {
        for y in p.y0..p.y1.min(height) {
            for x in p.x0..p.x1.min(width) {
                disp.set(x, y, p.value);
            }
        }
    }
    disp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_has_both_shades() {
        let h = board_placement((10.0, 10.0), 20.0);
        let img = warped_checkerboard(4, 5, 1.0, &h, 140, 120);
        let dark = img.as_slice().iter().filter(|&&v| v == BOARD_DARK).count();
        let light = img.as_slice().iter().filter(|&&v| v == BOARD_LIGHT).count();
        assert!(dark > 0 && light > 0);
    }

    #[test]
    fn inner_corner_count_matches_grid() {
        let h = board_placement((0.0, 0.0), 10.0);
        let corners = inner_corner_pixels(7, 10, 1.0, &h);
        assert_eq!(corners.len(), 6 * 9);
        // first inner corner sits one square in from the origin
        assert!((corners[0] - Pt2::new(10.0, 10.0)).norm() < 1e-12);
    }

    #[test]
    fn noise_texture_is_deterministic() {
        let a = noise_texture(16, 16, 7);
        let b = noise_texture(16, 16, 7);
        assert_eq!(a, b);
        let c = noise_texture(16, 16, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn plateaus_leave_background_invalid() {
        let disp = plateau_disparity(
            10,
            10,
            &[Plateau {
                x0: 2,
                y0: 2,
                x1: 5,
                y1: 5,
                value: 20.0,
            }],
        );
        assert!(DisparityMap::is_valid(disp.get(3, 3)));
        assert!(!DisparityMap::is_valid(disp.get(0, 0)));
    }
}
