//! Lightness equalization for X-ray contrast.
//!
//! The image goes to Lab, CLAHE (clip limit 2.0, 8x8 tiles) runs on the L
//! plane only, and the result goes back to RGB. With the `opencv` feature
//! this is OpenCV's `cvtColor` + `createCLAHE`; without it the built-in
//! implementation in `clahe`/`color` follows the same 8-bit conventions.

use cardioscan_core::AnalysisError;
use image::RgbImage;

const CLIP_LIMIT: f32 = 2.0;
const TILE_GRID: usize = 8;

#[cfg(feature = "opencv")]
pub(crate) fn equalize_lightness(rgb: &RgbImage) -> Result<RgbImage, AnalysisError> {
    use opencv::core::{self, Mat, Scalar, Size, Vector};
    use opencv::imgproc;
    use opencv::prelude::*;

    let cv_err =
        |e: opencv::Error| AnalysisError::Inference(format!("contrast enhancement failed: {e}"));

    let (w, h) = rgb.dimensions();
    let mut src = Mat::new_rows_cols_with_default(h as i32, w as i32, core::CV_8UC3, Scalar::all(0.0))
        .map_err(cv_err)?;
    src.data_bytes_mut().map_err(cv_err)?.copy_from_slice(rgb.as_raw());

    let mut lab = Mat::default();
    imgproc::cvt_color(&src, &mut lab, imgproc::COLOR_RGB2Lab, 0).map_err(cv_err)?;
    let mut planes = Vector::<Mat>::new();
    core::split(&lab, &mut planes).map_err(cv_err)?;

    let grid = TILE_GRID as i32;
    let mut clahe = imgproc::create_clahe(f64::from(CLIP_LIMIT), Size::new(grid, grid)).map_err(cv_err)?;
    let mut lightness = Mat::default();
    clahe.apply(&planes.get(0).map_err(cv_err)?, &mut lightness).map_err(cv_err)?;
    planes.set(0, lightness).map_err(cv_err)?;

    let mut merged = Mat::default();
    core::merge(&planes, &mut merged).map_err(cv_err)?;
    let mut out = Mat::default();
    imgproc::cvt_color(&merged, &mut out, imgproc::COLOR_Lab2RGB, 0).map_err(cv_err)?;

    let bytes = out.data_bytes().map_err(cv_err)?.to_vec();
    RgbImage::from_raw(w, h, bytes).ok_or_else(|| {
        AnalysisError::Inference("contrast enhancement returned an unexpected image size".into())
    })
}

#[cfg(not(feature = "opencv"))]
pub(crate) fn equalize_lightness(rgb: &RgbImage) -> Result<RgbImage, AnalysisError> {
    use crate::clahe::Clahe;
    use crate::color::{lab_to_rgb, rgb_to_lab};

    let (w, h) = rgb.dimensions();
    let lab: Vec<[u8; 3]> = rgb.pixels().map(|p| rgb_to_lab(p.0)).collect();

    let lightness: Vec<u8> = lab.iter().map(|px| px[0]).collect();
    let equalized = Clahe::new(CLIP_LIMIT, TILE_GRID, TILE_GRID).apply(&lightness, w as usize, h as usize);

    let mut out = RgbImage::new(w, h);
    for ((dst, src), l) in out.pixels_mut().zip(&lab).zip(equalized) {
        dst.0 = lab_to_rgb([l, src[1], src[2]]);
    }
    Ok(out)
}
