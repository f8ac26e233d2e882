//! The interactive calibration workflow.
//!
//! Corner detection is separated from the solve so the operator can accept
//! or reject individual pairs cheaply and only pay for the nonlinear
//! refinement once enough good samples exist.

use crate::corners::{detect_inner_corners, CornerDetectOptions};
use crate::homography::dlt_homography;
use crate::planar_pose::{average_isometries, pose_from_homography};
use crate::rectify::stereo_rectify;
use crate::refine::{self, SolveOptions, StereoBundleProblem, StereoView};
use crate::store::{CalibrationParameters, CalibrationStore};
use crate::target::ChessboardGeometry;
use crate::zhang::estimate_intrinsics;
use std::path::Path;
use stereo_core::image::io::load_gray;
use stereo_core::{CalibrationError, FramePair, Pt2, RadialDistortion, Side};

/// Detected inner-corner grids of one accepted image pair, row-major.
#[derive(Clone, Debug)]
pub struct CornerPair {
    pub left: Vec<Pt2>,
    pub right: Vec<Pt2>,
}

/// Accumulates corner pairs and solves the stereo rig.
pub struct Calibrator {
    geometry: ChessboardGeometry,
    image_size: (usize, usize),
    detect_opts: CornerDetectOptions,
    min_pairs: usize,
    views: Vec<CornerPair>,
}

impl Calibrator {
    pub fn new(geometry: ChessboardGeometry, image_size: (usize, usize)) -> Self {
        Self {
            geometry,
            image_size,
            detect_opts: CornerDetectOptions::default(),
            min_pairs: 10,
            views: Vec::new(),
        }
    }

    /// Lower the minimum accepted-pair count (primarily for tests).
    pub fn with_min_pairs(mut self, min_pairs: usize) -> Self {
        self.min_pairs = min_pairs.max(3);
        self
    }

    pub fn geometry(&self) -> &ChessboardGeometry {
        &self.geometry
    }

    pub fn accepted_pairs(&self) -> usize {
        self.views.len()
    }

    /// Locate the full corner grid in both images of a pair.
    ///
    /// Fails if either side misses the pattern; the caller must discard the
    /// pair rather than feed partial corners into the solve.
    pub fn corner_detect(&self, pair: &FramePair) -> Result<CornerPair, CalibrationError> {
        let left = detect_inner_corners(&pair.left, &self.geometry, &self.detect_opts, Side::Left)?;
        let right =
            detect_inner_corners(&pair.right, &self.geometry, &self.detect_opts, Side::Right)?;
        Ok(CornerPair { left, right })
    }

    /// Accept a detected pair into the sample set.
    pub fn push_pair(&mut self, pair: CornerPair) {
        self.views.push(pair);
    }

    /// Feed a corner pair straight from known pixel observations.
    ///
    /// Used when corners come from somewhere other than [`corner_detect`],
    /// e.g. synthetic projections in tests.
    ///
    /// [`corner_detect`]: Calibrator::corner_detect
    pub fn push_observations(&mut self, left: Vec<Pt2>, right: Vec<Pt2>) {
        self.views.push(CornerPair { left, right });
    }

    /// Solve the rig from the accumulated pairs.
    ///
    /// Linear initialization (homographies → Zhang intrinsics → planar
    /// poses → pose averaging) followed by a joint LM refinement of both
    /// cameras, the extrinsics, and every view pose.
    pub fn calibrate_camera(&self) -> Result<CalibrationParameters, CalibrationError> {
        if self.views.len() < self.min_pairs {
            return Err(CalibrationError::InsufficientSamples {
                required: self.min_pairs,
                got: self.views.len(),
            });
        }

        let object_2d = self.geometry.object_points_2d();
        let mut h_left = Vec::with_capacity(self.views.len());
        let mut h_right = Vec::with_capacity(self.views.len());
        for view in &self.views {
            h_left.push(dlt_homography(&object_2d, &view.left)?);
            h_right.push(dlt_homography(&object_2d, &view.right)?);
        }

        let k_left = estimate_intrinsics(&h_left)?;
        let k_right = estimate_intrinsics(&h_right)?;
        log::debug!(
            "linear init: left fx={:.1} fy={:.1}, right fx={:.1} fy={:.1}",
            k_left.fx,
            k_left.fy,
            k_right.fx,
            k_right.fy
        );

        let kmtx_left = k_left.k_matrix();
        let kmtx_right = k_right.k_matrix();
        let mut poses_left = Vec::with_capacity(self.views.len());
        let mut relative = Vec::with_capacity(self.views.len());
        for (hl, hr) in h_left.iter().zip(&h_right) {
            let pose_l = pose_from_homography(&kmtx_left, hl)?;
            let pose_r = pose_from_homography(&kmtx_right, hr)?;
            relative.push(pose_r * pose_l.inverse());
            poses_left.push(pose_l);
        }
        let extrinsics_init = average_isometries(&relative)?;

        let object = self.geometry.object_points();
        let views: Vec<StereoView> = self
            .views
            .iter()
            .map(|v| StereoView {
                left: v.left.clone(),
                right: v.right.clone(),
            })
            .collect();
        let problem = StereoBundleProblem::new(object, views);

        let zero = RadialDistortion::default();
        let x0 = problem.pack(&k_left, &zero, &k_right, &zero, &extrinsics_init, &poses_left);
        let (x, report) = refine::solve(&problem, x0, &SolveOptions::default());
        if !report.converged {
            log::warn!(
                "refinement stopped without convergence after {} evaluations (cost {:.3e})",
                report.evaluations,
                report.final_cost
            );
        }

        let solution = problem.unpack(&x);
        let mean_reproj_error = problem.mean_reprojection_error(&x);
        log::info!(
            "stereo calibration solved: {} views, mean reprojection error {:.4} px, baseline {:.4} m",
            self.views.len(),
            mean_reproj_error,
            solution.extrinsics.translation.vector.norm()
        );

        let rectified = stereo_rectify(
            &solution.left,
            &solution.right,
            &solution.extrinsics,
            self.image_size,
        )?;

        Ok(CalibrationParameters {
            left: solution.left,
            left_distortion: solution.left_distortion,
            right: solution.right,
            right_distortion: solution.right_distortion,
            extrinsics: solution.extrinsics,
            rectified,
            image_size: self.image_size,
            mean_reproj_error,
        })
    }

    /// Run the whole offline process: read up to `n` image pairs from
    /// `image_folder` (`left_NN.png` / `right_NN.png`), detect corners on
    /// each (skipping and logging failures), solve, and persist the result
    /// into `data_dir`.
    pub fn calibration_process(
        &mut self,
        n: usize,
        image_folder: &Path,
        data_dir: &Path,
    ) -> Result<CalibrationStore, CalibrationError> {
        for idx in 1..=n {
            let left_path = image_folder.join(format!("left_{idx:02}.png"));
            let right_path = image_folder.join(format!("right_{idx:02}.png"));
            if !left_path.exists() || !right_path.exists() {
                log::warn!("pair {idx:02} incomplete on disk, skipping");
                continue;
            }
            let left = match load_gray(&left_path) {
                Ok(img) => img,
                Err(e) => {
                    log::warn!("pair {idx:02}: {e}, skipping");
                    continue;
                }
            };
            let right = match load_gray(&right_path) {
                Ok(img) => img,
                Err(e) => {
                    log::warn!("pair {idx:02}: {e}, skipping");
                    continue;
                }
            };
            let pair = match FramePair::new(left, right, idx as u64) {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("pair {idx:02}: {e}, skipping");
                    continue;
                }
            };
            match self.corner_detect(&pair) {
                Ok(corners) => {
                    log::info!("pair {idx:02}: corners accepted");
                    self.push_pair(corners);
                }
                Err(e) => log::warn!("pair {idx:02}: {e}, skipping"),
            }
        }

        let params = self.calibrate_camera()?;
        let store = CalibrationStore::from_params(params);
        store.save_data(data_dir)?;
        Ok(store)
    }
}
