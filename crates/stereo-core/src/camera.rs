//! Camera models: pinhole intrinsics and Brown-Conrady radial distortion.

use crate::math::{Mat3, Pt2, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in pixels along X.
    pub fx: Real,
    /// Focal length in pixels along Y.
    pub fy: Real,
    /// Principal point X coordinate in pixels.
    pub cx: Real,
    /// Principal point Y coordinate in pixels.
    pub cy: Real,
    /// Skew term (typically 0).
    pub skew: Real,
}

impl CameraIntrinsics {
    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Map normalized sensor-plane coordinates into pixel coordinates.
    pub fn normalized_to_pixel(&self, n: &Vec2) -> Pt2 {
        Pt2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    /// Map pixel coordinates into normalized sensor-plane coordinates.
    pub fn pixel_to_normalized(&self, p: &Pt2) -> Vec2 {
        let y = (p.y - self.cy) / self.fy;
        let x = (p.x - self.cx - self.skew * y) / self.fx;
        Vec2::new(x, y)
    }
}

/// Brown-Conrady radial distortion restricted to the `k1, k2` pair.
///
/// Tangential terms and `k3` are held at zero; the stereo rig is calibrated
/// with that constraint to keep the solve stable on small sample counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadialDistortion {
    pub k1: Real,
    pub k2: Real,
}

impl RadialDistortion {
    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let r2 = n.x * n.x + n.y * n.y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;
        Vec2::new(n.x * radial, n.y * radial)
    }

    /// Invert distortion by fixed-point iteration.
    pub fn undistort(&self, d: &Vec2) -> Vec2 {
        let mut n = *d;
        for _ in 0..8 {
            let distorted = self.distort(&n);
            n.x -= distorted.x - d.x;
            n.y -= distorted.y - d.y;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_normalized_round_trip() {
        let k = CameraIntrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        };
        let p = Pt2::new(412.5, 133.25);
        let n = k.pixel_to_normalized(&p);
        let back = k.normalized_to_pixel(&n);
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn distortion_round_trip() {
        let dist = RadialDistortion { k1: -0.21, k2: 0.04 };
        let n = Vec2::new(0.3, -0.2);
        let d = dist.distort(&n);
        let back = dist.undistort(&d);
        assert!((back - n).norm() < 1e-9, "residual {}", (back - n).norm());
    }

    #[test]
    fn zero_distortion_is_identity() {
        let dist = RadialDistortion::default();
        let n = Vec2::new(0.7, 0.1);
        assert_eq!(dist.distort(&n), n);
        assert_eq!(dist.undistort(&n), n);
    }
}
