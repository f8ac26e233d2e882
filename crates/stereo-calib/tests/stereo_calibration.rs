//! End-to-end calibration scenarios on synthetic rigs.

use nalgebra::{Rotation3, Translation3, UnitQuaternion, Vector3};
use stereo_calib::projection::project_point;
use stereo_calib::{Calibrator, CalibrationStore, ChessboardGeometry};
use stereo_core::image::io::save_gray;
use stereo_core::synthetic::warped_checkerboard;
use stereo_core::{CameraIntrinsics, Iso3, Mat3, Pt2, RadialDistortion, Real};

fn left_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        fx: 410.0,
        fy: 405.0,
        cx: 239.5,
        cy: 179.5,
        skew: 0.0,
    }
}

fn right_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        fx: 398.0,
        fy: 402.0,
        cx: 241.0,
        cy: 178.0,
        skew: 0.0,
    }
}

fn rig_extrinsics() -> Iso3 {
    Iso3::from_parts(
        Translation3::new(-0.06, 0.003, -0.002),
        UnitQuaternion::from_scaled_axis(Vector3::new(0.01, -0.015, 0.004)),
    )
}

/// Board poses in the left camera frame, centred in front of the rig with
/// varied orientation so the intrinsics are well constrained.
fn board_poses(geometry: &ChessboardGeometry, n: usize) -> Vec<Iso3> {
    let half_w = geometry.cols as Real * geometry.square_size / 2.0;
    let half_h = geometry.rows as Real * geometry.square_size / 2.0;
    (0..n)
        .map(|v| {
            let i = v as Real;
            let rot = Rotation3::from_euler_angles(
                0.12 * ((i * 0.7).sin()),
                0.14 * ((i * 1.1).cos()),
                0.05 * ((i * 0.5).sin()),
            );
            let t = Vector3::new(
                -half_w + 0.01 * (i % 3.0),
                -half_h + 0.008 * (i % 4.0),
                0.95 + 0.04 * i,
            );
            Iso3::from_parts(Translation3::from(t), UnitQuaternion::from_rotation_matrix(&rot))
        })
        .collect()
}

#[test]
fn joint_refinement_recovers_synthetic_rig() {
    let geometry = ChessboardGeometry::new(7, 10, 0.03).unwrap();
    let object = geometry.object_points();

    let k_left = left_intrinsics();
    let k_right = right_intrinsics();
    let dist_left = RadialDistortion { k1: -0.05, k2: 0.01 };
    let dist_right = RadialDistortion { k1: -0.04, k2: 0.008 };
    let extr = rig_extrinsics();

    let mut calib = Calibrator::new(geometry, (480, 360));
    for pose in board_poses(&geometry, 10) {
        let right_pose = extr * pose;
        let left: Vec<Pt2> = object
            .iter()
            .map(|p| project_point(&pose, &k_left, &dist_left, p).expect("visible"))
            .collect();
        let right: Vec<Pt2> = object
            .iter()
            .map(|p| project_point(&right_pose, &k_right, &dist_right, p).expect("visible"))
            .collect();
        calib.push_observations(left, right);
    }

    let params = calib.calibrate_camera().expect("solve");

    assert!(
        params.mean_reproj_error < 0.01,
        "mean reprojection error {} px",
        params.mean_reproj_error
    );
    assert!((params.left.fx - k_left.fx).abs() < 1.0, "left fx {}", params.left.fx);
    assert!((params.left.fy - k_left.fy).abs() < 1.0);
    assert!((params.right.fx - k_right.fx).abs() < 1.0);
    assert!((params.left_distortion.k1 - dist_left.k1).abs() < 5e-3);
    assert!(
        (params.baseline() - extr.translation.vector.norm()).abs() < 1e-3,
        "baseline {}",
        params.baseline()
    );
    // The rectified views share one focal length and a pure-x baseline.
    assert!(params.rectified.tx < 0.0);
    assert!((params.rectified.tx.abs() - params.baseline()).abs() < 1e-9);
}

/// Plane-to-pixel homography of a board pose: H = K [r1 r2 t].
fn board_homography(k: &CameraIntrinsics, pose: &Iso3) -> Mat3 {
    let kmtx = k.k_matrix();
    let r = pose.rotation.to_rotation_matrix();
    let mut h = Mat3::zeros();
    h.set_column(0, &(kmtx * r.matrix().column(0)));
    h.set_column(1, &(kmtx * r.matrix().column(1)));
    h.set_column(2, &(kmtx * pose.translation.vector));
    h
}

#[test]
fn calibration_process_solves_from_rendered_images() {
    let geometry = ChessboardGeometry::new(7, 10, 0.03).unwrap();
    let k_left = left_intrinsics();
    let k_right = right_intrinsics();
    let extr = rig_extrinsics();

    let image_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();

    // Render pairs 1..=6; request 8 so two incomplete slots must be skipped.
    for (idx, pose) in board_poses(&geometry, 6).iter().enumerate() {
        let h_left = board_homography(&k_left, pose);
        let h_right = board_homography(&k_right, &(extr * pose));
        let left = warped_checkerboard(7, 10, 0.03, &h_left, 480, 360);
        let right = warped_checkerboard(7, 10, 0.03, &h_right, 480, 360);
        save_gray(&left, &image_dir.path().join(format!("left_{:02}.png", idx + 1))).unwrap();
        save_gray(
            &right,
            &image_dir.path().join(format!("right_{:02}.png", idx + 1)),
        )
        .unwrap();
    }

    let mut calib = Calibrator::new(geometry, (480, 360)).with_min_pairs(6);
    let store = calib
        .calibration_process(8, image_dir.path(), data_dir.path())
        .expect("calibration from rendered images");

    let params = store.params();
    assert!(
        params.mean_reproj_error < 1.0,
        "mean reprojection error {} px",
        params.mean_reproj_error
    );
    assert!(
        (params.baseline() - extr.translation.vector.norm()).abs() < 0.006,
        "baseline {}",
        params.baseline()
    );

    // The persisted artifacts reload into an equivalent store.
    let reloaded = CalibrationStore::load_data(data_dir.path()).expect("reload");
    assert_eq!(reloaded.params().image_size, (480, 360));
    assert_eq!(reloaded.maps().size(), (480, 360));
}
