//! PNG load/save bridging to the `image` crate.

use super::ImageU8;
use crate::errors::CaptureError;
use image::{GrayImage, RgbImage};
use std::path::Path;

/// Load a grayscale PNG (or any format the `image` crate recognizes).
pub fn load_gray(path: &Path) -> Result<ImageU8, CaptureError> {
    let img = image::open(path)
        .map_err(|e| CaptureError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .into_luma8();
    let (w, h) = img.dimensions();
    Ok(ImageU8::from_vec(w as usize, h as usize, img.into_raw()))
}

/// Save a grayscale buffer as PNG.
pub fn save_gray(img: &ImageU8, path: &Path) -> Result<(), CaptureError> {
    let (w, h) = img.size();
    let buf = GrayImage::from_raw(w as u32, h as u32, img.as_slice().to_vec())
        .expect("dimensions match buffer length");
    buf.save(path).map_err(|e| CaptureError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Save an interleaved RGB buffer as PNG.
pub fn save_rgb(w: usize, h: usize, rgb: Vec<u8>, path: &Path) -> Result<(), CaptureError> {
    let buf = RgbImage::from_raw(w as u32, h as u32, rgb).expect("dimensions match buffer length");
    buf.save(path).map_err(|e| CaptureError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
