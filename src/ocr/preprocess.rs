use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use imageproc::filter::{median_filter, sharpen3x3};

use crate::error::{CaptchaError, CaptchaResult};

/// Every CAPTCHA is rescaled to this width before anything else happens.
/// Otsu and the polarity ROI are tuned against strokes at this scale.
pub const TARGET_WIDTH: u32 = 180;

/// Median window radius (1 = 3x3).
const MEDIAN_RADIUS: u32 = 1;

/// Height that keeps the aspect ratio at `TARGET_WIDTH`, rounded to the nearest pixel.
pub fn scaled_height(width: u32, height: u32) -> u32 {
    let scaled = (height as f64 * TARGET_WIDTH as f64 / width as f64).round() as u32;
    scaled.max(1)
}

/// Converts a decoded CAPTCHA into the normalized grayscale raster.
///
/// Resizes to `TARGET_WIDTH` (aspect preserved), converts to grayscale,
/// sharpens with a 4-neighbour kernel to undo resize blur, then applies a
/// 3x3 median filter to remove speckle while keeping stroke edges.
pub fn normalize(img: &DynamicImage) -> CaptchaResult<GrayImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptchaError::InvalidImage(format!(
            "degenerate dimensions {}x{}",
            width, height
        )));
    }

    let resized = img.resize_exact(TARGET_WIDTH, scaled_height(width, height), FilterType::Lanczos3);
    let gray = resized.to_luma8();
    let sharpened = sharpen3x3(&gray);

    Ok(median_filter(&sharpened, MEDIAN_RADIUS, MEDIAN_RADIUS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(90, 30), 60);
        assert_eq!(scaled_height(360, 100), 50);
        // 3 * 180 / 7 = 77.14
        assert_eq!(scaled_height(7, 3), 77);
        // 1 * 180 / 400 = 0.45 rounds to 0, clamped to 1
        assert_eq!(scaled_height(400, 1), 1);
    }

    #[test]
    fn test_normalize_resizes_to_target_width() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(90, 30, Rgb([200, 10, 10])));
        let gray = normalize(&img).unwrap();

        assert_eq!(gray.dimensions(), (TARGET_WIDTH, 60));
    }

    #[test]
    fn test_normalize_rejects_empty_image() {
        let img = DynamicImage::new_luma8(0, 10);
        let err = normalize(&img).unwrap_err();
        assert!(matches!(err, CaptchaError::InvalidImage(_)));

        let img = DynamicImage::new_rgb8(10, 0);
        assert!(normalize(&img).is_err());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(123, 41, |x, y| {
            Luma([((x * 7 + y * 13) % 256) as u8])
        }));

        let first = normalize(&img).unwrap();
        let second = normalize(&img).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn test_median_removes_isolated_speckle() {
        let mut src = GrayImage::from_pixel(TARGET_WIDTH, 60, Luma([200]));
        src.put_pixel(90, 30, Luma([0]));

        let gray = normalize(&DynamicImage::ImageLuma8(src)).unwrap();

        // The dark dot is sharpened into a cross, but the median wipes it out
        assert!(gray.get_pixel(90, 30)[0] > 150);
        assert!(gray.get_pixel(20, 20)[0] > 150);
    }
}
