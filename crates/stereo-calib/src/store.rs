//! Persistence of solved calibrations.
//!
//! A calibration is written once after the solve and reloaded on every
//! subsequent run: parameters as JSON (lossless f64), the bulky remap tables
//! as bincode (bit-exact f32), plus a human-readable summary table. The
//! store is the only calibration object the live loop touches, and only
//! through [`CalibrationStore::rectify`].

use crate::rectify::{build_rectification_maps, remap_bilinear, RectificationMaps, RectifiedGeometry};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use stereo_core::{
    CalibrationError, CameraIntrinsics, FramePair, ImageF32, Iso3, RadialDistortion, Real,
};

const PARAMS_FILE: &str = "calibration.json";
const MAPS_FILE: &str = "rectification_maps.bin";
const SUMMARY_FILE: &str = "calibration_summary.txt";

/// Everything the stereo solve produces. Immutable once constructed; a
/// recalibration builds a new instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub left: CameraIntrinsics,
    pub left_distortion: RadialDistortion,
    pub right: CameraIntrinsics,
    pub right_distortion: RadialDistortion,
    /// Maps left-camera coordinates into right-camera coordinates.
    pub extrinsics: Iso3,
    pub rectified: RectifiedGeometry,
    /// Resolution the rig was calibrated at; frames must match it.
    pub image_size: (usize, usize),
    /// Mean reprojection error of the refined solution, pixels.
    pub mean_reproj_error: Real,
}

impl CalibrationParameters {
    pub fn baseline(&self) -> Real {
        self.rectified.baseline
    }

    pub fn focal(&self) -> Real {
        self.rectified.focal()
    }
}

/// Flat on-disk layout of the remap tables.
#[derive(Serialize, Deserialize)]
struct MapsOnDisk {
    width: usize,
    height: usize,
    left_x: Vec<f32>,
    left_y: Vec<f32>,
    right_x: Vec<f32>,
    right_y: Vec<f32>,
}

/// Owner of [`CalibrationParameters`] and [`RectificationMaps`] for the
/// process lifetime.
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    params: CalibrationParameters,
    maps: RectificationMaps,
}

impl CalibrationStore {
    /// Build a store from freshly solved parameters, deriving the maps.
    pub fn from_params(params: CalibrationParameters) -> Self {
        let maps = build_rectification_maps(
            &params.left,
            &params.left_distortion,
            &params.right,
            &params.right_distortion,
            &params.rectified,
            params.image_size,
        );
        Self { params, maps }
    }

    pub fn params(&self) -> &CalibrationParameters {
        &self.params
    }

    pub fn maps(&self) -> &RectificationMaps {
        &self.maps
    }

    /// Apply the stored maps to a captured pair, producing the undistorted,
    /// epipolar-aligned pair.
    pub fn rectify(&self, pair: &FramePair) -> Result<FramePair, CalibrationError> {
        if pair.size() != self.maps.size() {
            let (mw, mh) = self.maps.size();
            let (pw, ph) = pair.size();
            return Err(CalibrationError::Corrupt(format!(
                "rectification maps are {mw}x{mh} but frames are {pw}x{ph}; recalibrate at the capture resolution"
            )));
        }
        let left = remap_bilinear(&pair.left, &self.maps.left_x, &self.maps.left_y);
        let right = remap_bilinear(&pair.right, &self.maps.right_x, &self.maps.right_y);
        let mut out = FramePair::new(left, right, pair.seq)
            .expect("remap preserves dimensions");
        out.accepted = pair.accepted;
        Ok(out)
    }

    /// Persist parameters, maps, and the summary table into `dir`.
    pub fn save_data(&self, dir: &Path) -> Result<(), CalibrationError> {
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(&self.params)
            .map_err(|e| CalibrationError::Corrupt(format!("cannot serialize parameters: {e}")))?;
        std::fs::write(dir.join(PARAMS_FILE), json)?;

        let (width, height) = self.maps.size();
        let on_disk = MapsOnDisk {
            width,
            height,
            left_x: self.maps.left_x.as_slice().to_vec(),
            left_y: self.maps.left_y.as_slice().to_vec(),
            right_x: self.maps.right_x.as_slice().to_vec(),
            right_y: self.maps.right_y.as_slice().to_vec(),
        };
        let file = File::create(dir.join(MAPS_FILE))?;
        bincode::serialize_into(BufWriter::new(file), &on_disk)
            .map_err(|e| CalibrationError::Corrupt(format!("cannot serialize maps: {e}")))?;

        let mut summary = File::create(dir.join(SUMMARY_FILE))?;
        write!(summary, "{}", self.summary_table())?;
        log::info!("calibration saved to {}", dir.display());
        Ok(())
    }

    /// Reconstruct a store from a directory written by [`save_data`].
    ///
    /// [`save_data`]: CalibrationStore::save_data
    pub fn load_data(dir: &Path) -> Result<Self, CalibrationError> {
        let params_path = dir.join(PARAMS_FILE);
        if !params_path.exists() {
            return Err(CalibrationError::Missing(params_path));
        }
        let json = std::fs::read_to_string(&params_path)?;
        let params: CalibrationParameters = serde_json::from_str(&json)
            .map_err(|e| CalibrationError::Corrupt(format!("{}: {e}", params_path.display())))?;

        let maps_path = dir.join(MAPS_FILE);
        if !maps_path.exists() {
            return Err(CalibrationError::Missing(maps_path));
        }
        let file = File::open(&maps_path)?;
        let on_disk: MapsOnDisk = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| CalibrationError::Corrupt(format!("{}: {e}", maps_path.display())))?;

        if (on_disk.width, on_disk.height) != params.image_size {
            return Err(CalibrationError::Corrupt(format!(
                "maps are {}x{} but parameters expect {}x{}",
                on_disk.width, on_disk.height, params.image_size.0, params.image_size.1
            )));
        }
        let expected = on_disk.width * on_disk.height;
        for (name, table) in [
            ("left_x", &on_disk.left_x),
            ("left_y", &on_disk.left_y),
            ("right_x", &on_disk.right_x),
            ("right_y", &on_disk.right_y),
        ] {
            if table.len() != expected {
                return Err(CalibrationError::Corrupt(format!(
                    "map table {name} has {} entries, expected {expected}",
                    table.len()
                )));
            }
        }

        let maps = RectificationMaps {
            left_x: ImageF32::from_vec(on_disk.width, on_disk.height, on_disk.left_x),
            left_y: ImageF32::from_vec(on_disk.width, on_disk.height, on_disk.left_y),
            right_x: ImageF32::from_vec(on_disk.width, on_disk.height, on_disk.right_x),
            right_y: ImageF32::from_vec(on_disk.width, on_disk.height, on_disk.right_y),
        };
        log::info!("calibration loaded from {}", dir.display());
        Ok(Self { params, maps })
    }

    fn summary_table(&self) -> String {
        let p = &self.params;
        let mut s = String::new();
        s.push_str("stereo calibration summary\n");
        s.push_str("==========================\n");
        s.push_str(&format!(
            "image size: {} x {}\n",
            p.image_size.0, p.image_size.1
        ));
        s.push_str(&format!(
            "mean reprojection error: {:.4} px\n\n",
            p.mean_reproj_error
        ));
        s.push_str("camera          fx          fy          cx          cy          k1          k2\n");
        for (name, k, d) in [
            ("left ", &p.left, &p.left_distortion),
            ("right", &p.right, &p.right_distortion),
        ] {
            s.push_str(&format!(
                "{name}   {:>9.3}   {:>9.3}   {:>9.3}   {:>9.3}   {:>9.5}   {:>9.5}\n",
                k.fx, k.fy, k.cx, k.cy, d.k1, d.k2
            ));
        }
        let t = p.extrinsics.translation.vector;
        let angle_deg = p.extrinsics.rotation.angle().to_degrees();
        s.push_str(&format!(
            "\nextrinsics: rotation {angle_deg:.3} deg, translation [{:.5}, {:.5}, {:.5}] m\n",
            t.x, t.y, t.z
        ));
        s.push_str(&format!(
            "rectified: focal {:.3} px, baseline {:.5} m\n",
            p.rectified.focal(),
            p.rectified.baseline
        ));
        s
    }
}
