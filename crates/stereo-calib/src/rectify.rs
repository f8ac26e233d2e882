//! Rectification geometry and pixel remap tables.
//!
//! `stereo_rectify` follows the Bouguet construction: both cameras are
//! rotated halfway toward a common orientation, then a shared rotation
//! aligns the baseline with the image rows. The remap tables trace each
//! rectified pixel back through the inverse rotation and the lens distortion
//! to a source position in the original frame.

use nalgebra::{Matrix3x4, Rotation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use stereo_core::{
    CalibrationError, CameraIntrinsics, ImageF32, ImageU8, Iso3, Mat3, RadialDistortion, Real,
    Vec3,
};

/// Row-aligning rotations and the shared rectified pinhole model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RectifiedGeometry {
    /// Rotation applied to left-camera rays.
    pub r_left: Mat3,
    /// Rotation applied to right-camera rays.
    pub r_right: Mat3,
    /// Shared intrinsics of both rectified views (zero skew).
    pub intrinsics: CameraIntrinsics,
    /// Physical distance between the rectified optical centres.
    pub baseline: Real,
    /// Sign-carrying horizontal offset of the right camera (`±baseline`).
    pub tx: Real,
}

impl RectifiedGeometry {
    pub fn focal(&self) -> Real {
        self.intrinsics.fx
    }

    /// Projection matrix of the rectified left view, `K_rect [I | 0]`.
    pub fn p_left(&self) -> Matrix3x4<Real> {
        let k = self.intrinsics.k_matrix();
        let mut p = Matrix3x4::zeros();
        p.fixed_view_mut::<3, 3>(0, 0).copy_from(&k);
        p
    }

    /// Projection matrix of the rectified right view; column 3 carries the
    /// baseline term `fx * tx`.
    pub fn p_right(&self) -> Matrix3x4<Real> {
        let mut p = self.p_left();
        p[(0, 3)] = self.intrinsics.fx * self.tx;
        p
    }
}

/// Compute the rectifying rotations for a solved stereo rig.
///
/// `extrinsics` maps left-camera coordinates into right-camera coordinates.
pub fn stereo_rectify(
    left: &CameraIntrinsics,
    right: &CameraIntrinsics,
    extrinsics: &Iso3,
    image_size: (usize, usize),
) -> Result<RectifiedGeometry, CalibrationError> {
    let om = extrinsics.rotation.scaled_axis();
    let r_half = UnitQuaternion::from_scaled_axis(-0.5 * om);
    let t_new = r_half * extrinsics.translation.vector;

    let nt = t_new.norm();
    if nt < 1e-9 {
        return Err(CalibrationError::Degenerate(
            "stereo baseline is zero; cameras coincide".into(),
        ));
    }

    // Rotate the (half-corrected) baseline onto the x axis, keeping its sign.
    let c = t_new.x;
    let uu = Vec3::new(if c >= 0.0 { 1.0 } else { -1.0 }, 0.0, 0.0);
    let axis = t_new.cross(&uu);
    let angle = (c.abs() / nt).clamp(-1.0, 1.0).acos();
    let w_rot = if axis.norm() > 1e-12 {
        Rotation3::from_scaled_axis(axis.normalize() * angle)
    } else {
        Rotation3::identity()
    };

    let half_mat = r_half.to_rotation_matrix();
    let r_left = w_rot.matrix() * half_mat.matrix().transpose();
    let r_right = w_rot.matrix() * half_mat.matrix();
    let tx = (w_rot * t_new).x;

    let (w, h) = image_size;
    let focal = (left.fx + left.fy + right.fx + right.fy) / 4.0;
    let intrinsics = CameraIntrinsics {
        fx: focal,
        fy: focal,
        cx: (w as Real - 1.0) / 2.0,
        cy: (h as Real - 1.0) / 2.0,
        skew: 0.0,
    };

    Ok(RectifiedGeometry {
        r_left,
        r_right,
        intrinsics,
        baseline: nt,
        tx,
    })
}

/// Per-camera undistort+rectify lookup tables.
///
/// `map_x/map_y` give, for each rectified pixel, the source position in the
/// raw frame. Dimensions are fixed to the calibration image size.
#[derive(Clone, Debug)]
pub struct RectificationMaps {
    pub left_x: ImageF32,
    pub left_y: ImageF32,
    pub right_x: ImageF32,
    pub right_y: ImageF32,
}

impl RectificationMaps {
    pub fn size(&self) -> (usize, usize) {
        self.left_x.size()
    }
}

fn camera_maps(
    k: &CameraIntrinsics,
    dist: &RadialDistortion,
    r_rect: &Mat3,
    k_rect: &CameraIntrinsics,
    image_size: (usize, usize),
) -> (ImageF32, ImageF32) {
    let (w, h) = image_size;
    let r_inv = r_rect.transpose();
    let mut map_x = ImageF32::new(w, h, -1.0);
    let mut map_y = ImageF32::new(w, h, -1.0);
    for v in 0..h {
        for u in 0..w {
            let n = k_rect.pixel_to_normalized(&stereo_core::Pt2::new(u as Real, v as Real));
            let ray = r_inv * Vec3::new(n.x, n.y, 1.0);
            if ray.z <= 1e-9 {
                continue; // ray leaves the source frustum, stays unmapped
            }
            let nd = dist.distort(&stereo_core::Vec2::new(ray.x / ray.z, ray.y / ray.z));
            let src = k.normalized_to_pixel(&nd);
            map_x.set(u, v, src.x as f32);
            map_y.set(u, v, src.y as f32);
        }
    }
    (map_x, map_y)
}

/// Derive the full remap tables for both cameras.
pub fn build_rectification_maps(
    left: &CameraIntrinsics,
    left_dist: &RadialDistortion,
    right: &CameraIntrinsics,
    right_dist: &RadialDistortion,
    rectified: &RectifiedGeometry,
    image_size: (usize, usize),
) -> RectificationMaps {
    let (left_x, left_y) = camera_maps(
        left,
        left_dist,
        &rectified.r_left,
        &rectified.intrinsics,
        image_size,
    );
    let (right_x, right_y) = camera_maps(
        right,
        right_dist,
        &rectified.r_right,
        &rectified.intrinsics,
        image_size,
    );
    RectificationMaps {
        left_x,
        left_y,
        right_x,
        right_y,
    }
}

/// Bilinear remap; pixels whose source falls outside the frame become 0.
pub fn remap_bilinear(src: &ImageU8, map_x: &ImageF32, map_y: &ImageF32) -> ImageU8 {
    let (w, h) = map_x.size();
    let (sw, sh) = src.size();
    let mut out = ImageU8::new(w, h, 0);
    for y in 0..h {
        for x in 0..w {
            let sx = map_x.get(x, y);
            let sy = map_y.get(x, y);
            if sx < 0.0 || sy < 0.0 || sx > (sw - 1) as f32 || sy > (sh - 1) as f32 {
                continue;
            }
            let x0 = sx.floor() as usize;
            let y0 = sy.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let y1 = (y0 + 1).min(sh - 1);
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;
            let top = src.get(x0, y0) as f32 * (1.0 - fx) + src.get(x1, y0) as f32 * fx;
            let bot = src.get(x0, y1) as f32 * (1.0 - fx) + src.get(x1, y1) as f32 * fx;
            out.set(x, y, (top * (1.0 - fy) + bot * fy).round() as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;
    use stereo_core::Pt3;

    fn symmetric_k(w: usize, h: usize, f: Real) -> CameraIntrinsics {
        CameraIntrinsics {
            fx: f,
            fy: f,
            cx: (w as Real - 1.0) / 2.0,
            cy: (h as Real - 1.0) / 2.0,
            skew: 0.0,
        }
    }

    /// A rig that is already rectified: identical symmetric cameras, no
    /// rotation, baseline purely along x.
    fn ideal_rig(w: usize, h: usize) -> (CameraIntrinsics, Iso3) {
        let k = symmetric_k(w, h, 400.0);
        let extr = Iso3::from_parts(
            Translation3::new(-0.06, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        (k, extr)
    }

    #[test]
    fn ideal_rig_yields_identity_rotations() {
        let (k, extr) = ideal_rig(64, 48);
        let rect = stereo_rectify(&k, &k, &extr, (64, 48)).unwrap();
        assert!((rect.r_left - Mat3::identity()).norm() < 1e-12);
        assert!((rect.r_right - Mat3::identity()).norm() < 1e-12);
        assert!((rect.baseline - 0.06).abs() < 1e-12);
        assert!((rect.tx + 0.06).abs() < 1e-12, "tx {}", rect.tx);
        assert_eq!(rect.intrinsics, k);
    }

    #[test]
    fn ideal_rig_maps_are_identity() {
        let (k, extr) = ideal_rig(32, 24);
        let rect = stereo_rectify(&k, &k, &extr, (32, 24)).unwrap();
        let maps = build_rectification_maps(
            &k,
            &RadialDistortion::default(),
            &k,
            &RadialDistortion::default(),
            &rect,
            (32, 24),
        );
        for y in 0..24 {
            for x in 0..32 {
                assert!((maps.left_x.get(x, y) - x as f32).abs() < 1e-4);
                assert!((maps.left_y.get(x, y) - y as f32).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn rectified_projections_share_rows() {
        // A rig with a small relative rotation; after rectification, any 3D
        // point must land on the same row in both views.
        let k = symmetric_k(640, 480, 500.0);
        let rot = UnitQuaternion::from_scaled_axis(Vec3::new(0.02, -0.03, 0.01));
        let extr = Iso3::from_parts(Translation3::new(-0.06, 0.002, -0.001), rot);
        let rect = stereo_rectify(&k, &k, &extr, (640, 480)).unwrap();

        for p in [
            Pt3::new(0.1, -0.05, 1.2),
            Pt3::new(-0.2, 0.1, 0.8),
            Pt3::new(0.0, 0.0, 2.0),
        ] {
            // Left camera frame coordinates of the point, rotated into each
            // rectified frame, then projected with the shared intrinsics.
            let in_left = p.coords;
            let in_right = extr.transform_point(&p).coords;
            let l = rect.r_left * in_left;
            let r = rect.r_right * in_right;
            let lp = rect
                .intrinsics
                .normalized_to_pixel(&stereo_core::Vec2::new(l.x / l.z, l.y / l.z));
            let rp = rect
                .intrinsics
                .normalized_to_pixel(&stereo_core::Vec2::new(r.x / r.z, r.y / r.z));
            assert!(
                (lp.y - rp.y).abs() < 1e-6,
                "rows differ: {} vs {}",
                lp.y,
                rp.y
            );
            assert!(lp.x > rp.x, "disparity must be positive");
        }
    }

    #[test]
    fn remap_identity_preserves_image() {
        let mut src = ImageU8::new(8, 6, 0);
        src.set(3, 2, 200);
        let mut mx = ImageF32::new(8, 6, 0.0);
        let mut my = ImageF32::new(8, 6, 0.0);
        for y in 0..6 {
            for x in 0..8 {
                mx.set(x, y, x as f32);
                my.set(x, y, y as f32);
            }
        }
        assert_eq!(remap_bilinear(&src, &mx, &my), src);
    }

    #[test]
    fn coincident_cameras_are_degenerate() {
        let k = symmetric_k(64, 48, 400.0);
        let err = stereo_rectify(&k, &k, &Iso3::identity(), (64, 48)).unwrap_err();
        assert!(matches!(err, CalibrationError::Degenerate(_)));
    }
}
