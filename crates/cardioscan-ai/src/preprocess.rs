//! Image → tensor preprocessing for chest X-rays.
//!
//! Decoding is separate ([`load_image`]) so a bad file is reported before any
//! model work starts. The tensor path forces RGB, resizes to the model
//! resolution, equalizes lightness with CLAHE in Lab space, scales to
//! `[0, 1]`, and adds a batch axis. Output is NHWC: `[1, height, width, 3]`.

use std::path::Path;

use cardioscan_core::AnalysisError;
use image::DynamicImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use tracing::debug;

use crate::enhance::equalize_lightness;

/// Default model input resolution (square).
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Decode an image file of any format the `image` crate recognises.
pub fn load_image(path: &Path) -> Result<DynamicImage, AnalysisError> {
    let img = image::open(path).map_err(|e| AnalysisError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "decoded image"
    );
    Ok(img)
}

/// Converts decoded images into normalized model input tensors.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    width: u32,
    height: u32,
}

impl Preprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Resize, equalize and scale an already-decoded image.
    pub fn preprocess_image(&self, img: &DynamicImage) -> Result<Array4<f32>, AnalysisError> {
        let rgb = img.to_rgb8();
        let resized = imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
        let enhanced = equalize_lightness(&resized)?;

        let (w, h) = (self.width as usize, self.height as usize);
        let raw = enhanced.into_raw();
        Ok(Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            f32::from(raw[(y * w + x) * 3 + c]) / 255.0
        }))
    }
}
