//! Zhang's closed-form intrinsics initialization from plane homographies.

use nalgebra::{DMatrix, SVector};
use stereo_core::{CalibrationError, CameraIntrinsics, Mat3, Real};

/// The 6-vector `v_ij(H)` of Zhang's constraint system.
fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics from plane homographies (no distortion).
///
/// Needs at least 3 homographies from distinct board orientations; fewer, or
/// a motion-degenerate set (e.g. pure translations), yields
/// [`CalibrationError::Degenerate`].
pub fn estimate_intrinsics(homographies: &[Mat3]) -> Result<CameraIntrinsics, CalibrationError> {
    if homographies.len() < 3 {
        return Err(CalibrationError::Degenerate(format!(
            "Zhang init needs at least 3 homographies, got {}",
            homographies.len()
        )));
    }

    let m = homographies.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        let v12 = v_ij(h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibrationError::Degenerate("SVD failed in Zhang init".into()))?;
    let b = v_t.row(v_t.nrows() - 1);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    let denom_rel = if denom_norm > 0.0 {
        denom.abs() / denom_norm
    } else {
        0.0
    };
    if denom_rel <= 1e-8 {
        return Err(CalibrationError::Degenerate(
            "board poses do not constrain the intrinsics (B is singular)".into(),
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(CalibrationError::Degenerate(
            "inconsistent sign in Zhang solution; check the homographies".into(),
        ));
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn synthetic_homography(k: &Mat3, rot: Rotation3<Real>, t: Vector3<Real>) -> Mat3 {
        // For the Z=0 plane, H = K [r1 r2 t].
        let r = rot.matrix();
        let mut h = Mat3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    #[test]
    fn recovers_intrinsics_from_three_views() {
        let k_gt = CameraIntrinsics {
            fx: 900.0,
            fy: 880.0,
            cx: 420.0,
            cy: 410.0,
            skew: 0.0,
        };
        let kmtx = k_gt.k_matrix();
        let hs = vec![
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ];

        let est = estimate_intrinsics(&hs).unwrap();
        assert!((est.fx - k_gt.fx).abs() < 1.0, "fx {}", est.fx);
        assert!((est.fy - k_gt.fy).abs() < 1.0, "fy {}", est.fy);
        assert!((est.cx - k_gt.cx).abs() < 2.0, "cx {}", est.cx);
        assert!((est.cy - k_gt.cy).abs() < 2.0, "cy {}", est.cy);
        assert!(est.skew.abs() < 1e-3, "skew {}", est.skew);
    }

    #[test]
    fn two_views_are_not_enough() {
        let h = Mat3::identity();
        assert!(matches!(
            estimate_intrinsics(&[h, h]),
            Err(CalibrationError::Degenerate(_))
        ));
    }
}
