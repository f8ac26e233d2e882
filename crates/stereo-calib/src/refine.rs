//! Nonlinear joint refinement of the stereo rig.
//!
//! A single Levenberg-Marquardt problem refines both cameras' intrinsics and
//! distortion, the left→right extrinsics, and every per-view board pose
//! against all reprojection residuals at once. The Jacobian is evaluated by
//! central differences; the parameter count stays small enough (a few dozen
//! plus six per view) that this is never the bottleneck.

use crate::projection::project_point;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Translation3, UnitQuaternion};
use stereo_core::{CameraIntrinsics, Iso3, Pt2, Pt3, RadialDistortion, Real, Vec3};

/// Residual applied when a point projects behind a camera; large enough to
/// push the solver back into the feasible region.
const INFEASIBLE_RESIDUAL: Real = 1e4;

/// Dense nonlinear least-squares problem.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Central-difference Jacobian; override if an analytic one exists.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut jac = DMatrix::zeros(self.num_residuals(), self.num_params());
        let mut xp = x.clone();
        for j in 0..self.num_params() {
            let step = 1e-6 * x[j].abs().max(1.0);
            xp[j] = x[j] + step;
            let r_hi = self.residuals(&xp);
            xp[j] = x[j] - step;
            let r_lo = self.residuals(&xp);
            xp[j] = x[j];
            let col = (r_hi - r_lo) / (2.0 * step);
            jac.set_column(j, &col);
        }
        jac
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SolveOptions {
    pub max_iters: usize,
    pub ftol: Real,
    pub gtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-12,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SolveReport {
    pub evaluations: usize,
    pub final_cost: Real,
    pub converged: bool,
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Run Levenberg-Marquardt on `problem` starting from `x0`.
pub fn solve<P: NllsProblem>(
    problem: &P,
    x0: DVector<Real>,
    opts: &SolveOptions,
) -> (DVector<Real>, SolveReport) {
    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.ftol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iters.max(1));

    let wrapper = LmWrapper {
        problem,
        params: x0,
    };
    let (wrapper, report) = lm.minimize(wrapper);

    (
        wrapper.params(),
        SolveReport {
            evaluations: report.number_of_evaluations,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
        },
    )
}

/// One calibration view: the board grid plus its detected pixels per camera.
#[derive(Clone, Debug)]
pub struct StereoView {
    pub left: Vec<Pt2>,
    pub right: Vec<Pt2>,
}

/// Parameter block layout of the joint problem.
///
/// `[left fx fy cx cy k1 k2 | right … | extr (axis-angle, t) | view_0 pose …]`
const CAM_BLOCK: usize = 6;
const EXTR_OFFSET: usize = 2 * CAM_BLOCK;
const POSES_OFFSET: usize = EXTR_OFFSET + 6;

pub fn pose_to_params(iso: &Iso3, out: &mut [Real]) {
    let aa = iso.rotation.scaled_axis();
    out[0] = aa.x;
    out[1] = aa.y;
    out[2] = aa.z;
    out[3] = iso.translation.x;
    out[4] = iso.translation.y;
    out[5] = iso.translation.z;
}

pub fn pose_from_params(p: &[Real]) -> Iso3 {
    let rot = UnitQuaternion::from_scaled_axis(Vec3::new(p[0], p[1], p[2]));
    Iso3::from_parts(Translation3::new(p[3], p[4], p[5]), rot)
}

fn cam_from_params(p: &[Real]) -> (CameraIntrinsics, RadialDistortion) {
    (
        CameraIntrinsics {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
            skew: 0.0,
        },
        RadialDistortion { k1: p[4], k2: p[5] },
    )
}

/// Refined rig estimate unpacked from the parameter vector.
#[derive(Clone, Debug)]
pub struct StereoSolution {
    pub left: CameraIntrinsics,
    pub left_distortion: RadialDistortion,
    pub right: CameraIntrinsics,
    pub right_distortion: RadialDistortion,
    /// Maps left-camera coordinates into right-camera coordinates.
    pub extrinsics: Iso3,
    /// Board pose per view, in the left camera frame.
    pub view_poses: Vec<Iso3>,
}

/// Joint refinement problem over all views and both cameras.
pub struct StereoBundleProblem {
    object: Vec<Pt3>,
    views: Vec<StereoView>,
}

impl StereoBundleProblem {
    pub fn new(object: Vec<Pt3>, views: Vec<StereoView>) -> Self {
        Self { object, views }
    }

    pub fn pack(
        &self,
        left: &CameraIntrinsics,
        left_dist: &RadialDistortion,
        right: &CameraIntrinsics,
        right_dist: &RadialDistortion,
        extrinsics: &Iso3,
        view_poses: &[Iso3],
    ) -> DVector<Real> {
        let mut x = DVector::zeros(POSES_OFFSET + 6 * view_poses.len());
        for (offset, (k, d)) in [(0, (left, left_dist)), (CAM_BLOCK, (right, right_dist))] {
            x[offset] = k.fx;
            x[offset + 1] = k.fy;
            x[offset + 2] = k.cx;
            x[offset + 3] = k.cy;
            x[offset + 4] = d.k1;
            x[offset + 5] = d.k2;
        }
        pose_to_params(extrinsics, &mut x.as_mut_slice()[EXTR_OFFSET..POSES_OFFSET]);
        for (v, pose) in view_poses.iter().enumerate() {
            let at = POSES_OFFSET + 6 * v;
            pose_to_params(pose, &mut x.as_mut_slice()[at..at + 6]);
        }
        x
    }

    pub fn unpack(&self, x: &DVector<Real>) -> StereoSolution {
        let s = x.as_slice();
        let (left, left_distortion) = cam_from_params(&s[0..CAM_BLOCK]);
        let (right, right_distortion) = cam_from_params(&s[CAM_BLOCK..EXTR_OFFSET]);
        let extrinsics = pose_from_params(&s[EXTR_OFFSET..POSES_OFFSET]);
        let view_poses = (0..self.views.len())
            .map(|v| {
                let at = POSES_OFFSET + 6 * v;
                pose_from_params(&s[at..at + 6])
            })
            .collect();
        StereoSolution {
            left,
            left_distortion,
            right,
            right_distortion,
            extrinsics,
            view_poses,
        }
    }

    /// Mean reprojection error (pixels) over every observation.
    pub fn mean_reprojection_error(&self, x: &DVector<Real>) -> Real {
        let r = self.residuals(x);
        let n = r.len() / 2;
        let mut sum = 0.0;
        for i in 0..n {
            sum += (r[2 * i] * r[2 * i] + r[2 * i + 1] * r[2 * i + 1]).sqrt();
        }
        sum / n as Real
    }
}

impl NllsProblem for StereoBundleProblem {
    fn num_params(&self) -> usize {
        POSES_OFFSET + 6 * self.views.len()
    }

    fn num_residuals(&self) -> usize {
        4 * self.object.len() * self.views.len()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let sol = self.unpack(x);
        let mut r = DVector::zeros(self.num_residuals());
        let mut row = 0;
        for (view, pose) in self.views.iter().zip(&sol.view_poses) {
            let right_pose = sol.extrinsics * pose;
            for (i, pw) in self.object.iter().enumerate() {
                for (k, dist, obs, cam_pose) in [
                    (&sol.left, &sol.left_distortion, &view.left[i], pose),
                    (
                        &sol.right,
                        &sol.right_distortion,
                        &view.right[i],
                        &right_pose,
                    ),
                ] {
                    match project_point(cam_pose, k, dist, pw) {
                        Some(px) => {
                            r[row] = px.x - obs.x;
                            r[row + 1] = px.y - obs.y;
                        }
                        None => {
                            r[row] = INFEASIBLE_RESIDUAL;
                            r[row + 1] = INFEASIBLE_RESIDUAL;
                        }
                    }
                    row += 2;
                }
            }
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl NllsProblem for Quadratic {
        fn num_params(&self) -> usize {
            1
        }
        fn num_residuals(&self) -> usize {
            1
        }
        fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_element(1, x[0] - 3.0)
        }
    }

    #[test]
    fn lm_solves_trivial_problem() {
        let (x, report) = solve(&Quadratic, DVector::from_element(1, 10.0), &Default::default());
        assert!((x[0] - 3.0).abs() < 1e-6, "got {}", x[0]);
        assert!(report.converged, "no convergence: {report:?}");
        assert!(report.final_cost < 1e-12);
    }

    #[test]
    fn pose_params_round_trip() {
        let iso = Iso3::from_parts(
            Translation3::new(0.2, -0.4, 1.5),
            UnitQuaternion::from_scaled_axis(Vec3::new(0.1, -0.3, 0.02)),
        );
        let mut buf = [0.0; 6];
        pose_to_params(&iso, &mut buf);
        let back = pose_from_params(&buf);
        assert!((back.translation.vector - iso.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&iso.rotation) < 1e-12);
    }
}
