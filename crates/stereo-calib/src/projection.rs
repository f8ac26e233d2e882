//! Point projection through pose, distortion, and intrinsics.

use stereo_core::{CameraIntrinsics, Iso3, Pt2, Pt3, RadialDistortion, Vec2};

/// Project a world point into pixels: pose → perspective divide →
/// distortion → intrinsics. Returns `None` when the point is at or behind
/// the camera plane.
pub fn project_point(
    pose: &Iso3,
    k: &CameraIntrinsics,
    dist: &RadialDistortion,
    world: &Pt3,
) -> Option<Pt2> {
    let cam = pose.transform_point(world);
    if cam.z <= 1e-9 {
        return None;
    }
    let n = Vec2::new(cam.x / cam.z, cam.y / cam.z);
    let d = dist.distort(&n);
    Some(k.normalized_to_pixel(&d))
}
