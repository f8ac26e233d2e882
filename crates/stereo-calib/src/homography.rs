//! Plane homography estimation via the normalized DLT.

use nalgebra::DMatrix;
use stereo_core::{CalibrationError, Mat3, Pt2, Real};

/// Similarity transform centring `pts` on the origin with mean distance √2.
///
/// Conditioning step for the DLT; pixel coordinates in the hundreds would
/// otherwise dominate the design matrix.
fn normalizing_transform(pts: &[Pt2]) -> Mat3 {
    let n = pts.len() as Real;
    let cx = pts.iter().map(|p| p.x).sum::<Real>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<Real>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    let s = if mean_dist > 1e-12 {
        (2.0 as Real).sqrt() / mean_dist
    } else {
        1.0
    };
    Mat3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Estimate `H` such that `image ~ H * world` from point correspondences.
///
/// Needs at least 4 correspondences; both slices must have equal length.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, CalibrationError> {
    let n = world.len();
    if n < 4 || image.len() != n {
        return Err(CalibrationError::Degenerate(format!(
            "homography needs at least 4 matched points, got {n} world / {} image",
            image.len()
        )));
    }

    let t_world = normalizing_transform(world);
    let t_image = normalizing_transform(image);
    let norm = |t: &Mat3, p: &Pt2| {
        let v = t * stereo_core::to_homogeneous(p);
        Pt2::new(v.x / v.z, v.y / v.z)
    };

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in world.iter().zip(image.iter()).enumerate() {
        let pw = norm(&t_world, pw);
        let pi = norm(&t_image, pi);
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);

        let r0 = 2 * i;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Null vector of A via SVD (row of V^T with the smallest singular value).
    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibrationError::Degenerate("SVD failed in homography".into()))?;
    let h = v_t.row(v_t.nrows() - 1);

    let mut h_norm = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h_norm[(r, c)] = h[3 * r + c];
        }
    }

    // Undo the conditioning transforms.
    let t_image_inv = t_image
        .try_inverse()
        .ok_or_else(|| CalibrationError::Degenerate("singular normalization".into()))?;
    let mut h_mat = t_image_inv * h_norm * t_world;

    let scale = h_mat[(2, 2)];
    if scale.abs() < 1e-12 {
        return Err(CalibrationError::Degenerate(
            "homography has vanishing scale".into(),
        ));
    }
    h_mat /= scale;
    Ok(h_mat)
}

/// Apply a homography to one point.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Pt2 {
    stereo_core::from_homogeneous(&(h * stereo_core::to_homogeneous(p)))
}
