//! Polarity detection: are the digits lighter or darker than their surround?
//!
//! This is a heuristic. It assumes the central region is dominated by digit
//! strokes, so a bright centre means light digits on a dark background. It
//! does not find stroke pixels and can misjudge short or off-centre strings.

use image::GrayImage;
use std::ops::Range;

/// ROI left/top edge as a fraction of the image size.
pub const ROI_START: f64 = 0.25;
/// ROI right/bottom edge (exclusive) as a fraction of the image size.
pub const ROI_END: f64 = 0.75;
/// Mid-point of the intensity range; also the mean reported for an empty ROI.
pub const NEUTRAL_MEAN: f64 = 128.0;

/// Pixel ranges of the central ROI, `[floor(0.25 n), floor(0.75 n))` per axis.
pub fn roi_bounds(width: u32, height: u32) -> (Range<u32>, Range<u32>) {
    let span = |n: u32| (n as f64 * ROI_START).floor() as u32..(n as f64 * ROI_END).floor() as u32;
    (span(width), span(height))
}

/// Mean intensity over the central ROI, or `NEUTRAL_MEAN` if it holds no pixels.
pub fn roi_mean(img: &GrayImage) -> f64 {
    let (xs, ys) = roi_bounds(img.width(), img.height());

    let mut sum: u64 = 0;
    let mut count: u64 = 0;
    for y in ys {
        for x in xs.clone() {
            sum += img.get_pixel(x, y)[0] as u64;
            count += 1;
        }
    }

    if count == 0 {
        return NEUTRAL_MEAN;
    }
    sum as f64 / count as f64
}

/// True when the digits appear lighter than the background.
pub fn numbers_are_lighter(img: &GrayImage) -> bool {
    roi_mean(img) > NEUTRAL_MEAN
}
