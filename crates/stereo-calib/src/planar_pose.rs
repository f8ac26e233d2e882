//! Pose-from-homography decomposition for a planar target.

use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use stereo_core::{CalibrationError, Iso3, Mat3, Real, Vec3};

/// Decompose a plane-induced homography into the board pose `T_cam_board`,
/// assuming the target lies on `Z = 0` in its own coordinates.
pub fn pose_from_homography(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, CalibrationError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or_else(|| CalibrationError::Degenerate("intrinsics matrix is singular".into()))?;

    let h1 = k_inv * hmtx.column(0);
    let h2 = k_inv * hmtx.column(1);
    let h3: Vec3 = (k_inv * hmtx.column(2)).into_owned();

    let norm1 = h1.norm();
    let norm2 = h2.norm();
    if norm1 < 1e-12 || norm2 < 1e-12 {
        return Err(CalibrationError::Degenerate(
            "homography columns collapse under K^-1".into(),
        ));
    }
    // Average the two column norms for the scale; they differ only by noise.
    let lambda = 2.0 / (norm1 + norm2);

    let r1: Vec3 = (lambda * h1).into_owned();
    let r2: Vec3 = (lambda * h2).into_owned();
    let r3 = r1.cross(&r2);

    let mut r_mat = Mat3::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) via polar decomposition.
    let svd = r_mat.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| CalibrationError::Degenerate("SVD failed in pose recovery".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibrationError::Degenerate("SVD failed in pose recovery".into()))?;
    let mut u = u;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let r_orth = u * v_t;

    let mut t: Vec3 = lambda * h3;
    // The board must sit in front of the camera; a mirrored solution flips Z.
    if t.z < 0.0 {
        t = -t;
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

/// Quaternion-space average of rigid transforms, with hemisphere correction.
///
/// Only suitable for initialization; the nonlinear refinement owns the final
/// estimate.
pub fn average_isometries(poses: &[Iso3]) -> Result<Iso3, CalibrationError> {
    if poses.is_empty() {
        return Err(CalibrationError::Degenerate(
            "cannot average an empty set of poses".into(),
        ));
    }

    let mut t_sum = Vec3::zeros();
    for iso in poses {
        t_sum += iso.translation.vector;
    }
    let t_avg = Translation3::from(t_sum / poses.len() as Real);

    let q0 = poses[0].rotation;
    let mut acc = nalgebra::Vector4::<Real>::zeros();
    for iso in poses {
        let coords = iso.rotation.coords;
        let sign = if q0.coords.dot(&coords) < 0.0 { -1.0 } else { 1.0 };
        acc += coords * sign;
    }

    if acc.norm_squared() == 0.0 {
        return Ok(Iso3::from_parts(t_avg, UnitQuaternion::identity()));
    }
    let q = nalgebra::Quaternion::from_vector(acc / poses.len() as Real).normalize();
    Ok(Iso3::from_parts(t_avg, UnitQuaternion::from_quaternion(q)))
}
