use image::{GrayImage, ImageFormat};
use imageproc::contrast::{ThresholdType, threshold};
use std::io::Cursor;

use crate::error::{CaptchaError, CaptchaResult};

/// Pixel-wise `255 - v`.
pub fn invert(img: &GrayImage) -> GrayImage {
    let mut inverted = img.clone();
    image::imageops::invert(&mut inverted);
    inverted
}

/// Corrects polarity, then thresholds: samples above `cut` become 255, the
/// rest 0.
///
/// When `numbers_are_lighter` the image is inverted first, so `cut` must be
/// chosen on the inverted intensities. Either way the digits end up in the
/// 0 population and the background in the 255 one.
pub fn binarize(img: &GrayImage, numbers_are_lighter: bool, cut: u8) -> GrayImage {
    if numbers_are_lighter {
        threshold(&invert(img), cut, ThresholdType::Binary)
    } else {
        threshold(img, cut, ThresholdType::Binary)
    }
}

/// Encodes a binarized raster as a single-channel PNG for the OCR engine.
pub fn encode_png(img: &GrayImage) -> CaptchaResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(CaptchaError::EncodingFailure)?;
    Ok(bytes)
}
