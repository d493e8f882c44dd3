//! Exposure normalisation applied before keypoint detection.
//!
//! Surround cameras see very different brightness (sun side vs. shadow
//! side), so every image goes through the same chain: grayscale, power-law
//! gamma lookup, then contrast limited adaptive histogram equalisation.

use image::{GrayImage, RgbImage};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::PreprocessConfig;

/// 256-entry lookup table for `255 * (v / 255)^gamma`, rounded and saturated.
pub fn gamma_lut(gamma: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let p = (i as f64 / 255.0).powf(gamma as f64) * 255.0;
        *v = p.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Single channel `CV_8U` copy of `img`.
pub fn gray_to_mat(img: &GrayImage) -> opencv::Result<Mat> {
    Mat::from_slice_rows_cols(img.as_raw(), img.height() as usize, img.width() as usize)?.try_clone()
}

pub fn mat_to_gray(mat: &Mat) -> opencv::Result<GrayImage> {
    let (w, h) = (mat.cols() as u32, mat.rows() as u32);
    GrayImage::from_raw(w, h, mat.data_bytes()?.to_vec()).ok_or_else(|| {
        opencv::Error::new(
            opencv::core::StsUnmatchedSizes,
            format!("{}x{} buffer does not fit a gray image", w, h),
        )
    })
}

pub fn apply_gamma(img: &Mat, gamma: f32) -> opencv::Result<Mat> {
    let lut = Mat::from_slice(&gamma_lut(gamma))?.try_clone()?;
    let mut out = Mat::default();
    opencv::core::lut(img, &lut, &mut out)?;
    Ok(out)
}

/// CLAHE over a `tiles x tiles` grid.
pub fn clahe(img: &Mat, clip_limit: f32, tiles: u32) -> opencv::Result<Mat> {
    let tiles = tiles.max(1) as i32;
    let mut clahe = imgproc::create_clahe(clip_limit as f64, Size::new(tiles, tiles))?;
    let mut out = Mat::default();
    clahe.apply(img, &mut out)?;
    Ok(out)
}

/// Full preprocessing chain used before keypoint extraction.
pub fn preprocess(img: &RgbImage, config: &PreprocessConfig) -> opencv::Result<Mat> {
    let gray = gray_to_mat(&image::imageops::grayscale(img))?;
    let corrected = apply_gamma(&gray, config.gamma_exponent)?;
    clahe(&corrected, config.clahe_clip_limit, config.contrast_tile_size)
}
