pub mod binarize;
pub mod engine;
pub mod extract;
pub mod polarity;
pub mod preprocess;
pub mod service;
pub mod setup;
pub mod threshold;

pub use engine::{OcrEngine, OcrOutput, TesseractEngine};
pub use extract::extract_digits;
pub use service::{OcrService, Readiness};
pub use setup::ensure_tesseract;

use chrono::Local;
use image::{DynamicImage, GrayImage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::CaptchaResult;
use crate::source::{Fetcher, ImageSource, decode_image};

/// Everything the pipeline derived from one image.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Normalized grayscale raster
    pub grayscale: GrayImage,
    /// Digits judged lighter than the background
    pub numbers_are_lighter: bool,
    /// Otsu cut applied to the polarity-corrected intensities
    pub threshold: u8,
    /// Strictly 0/255 raster handed to OCR; digits are 0
    pub binary: GrayImage,
}

/// Normalizes, then binarizes a decoded CAPTCHA.
pub fn preprocess_captcha(img: &DynamicImage) -> CaptchaResult<Preprocessed> {
    let grayscale = preprocess::normalize(img)?;
    Ok(binarize_grayscale(grayscale))
}

/// Polarity detection, Otsu selection and binarization of a normalized raster.
pub fn binarize_grayscale(grayscale: GrayImage) -> Preprocessed {
    let numbers_are_lighter = polarity::numbers_are_lighter(&grayscale);

    // Otsu runs on the histogram the binarizer will actually threshold, so an
    // inverted source yields exactly the same binary image
    let mut hist = threshold::histogram(&grayscale);
    if numbers_are_lighter {
        hist.reverse();
    }
    let cut = threshold::otsu_threshold_from_histogram(&hist);

    let binary = binarize::binarize(&grayscale, numbers_are_lighter, cut);

    debug!(
        "Binarized {}x{}: lighter={} threshold={}",
        grayscale.width(),
        grayscale.height(),
        numbers_are_lighter,
        cut
    );

    Preprocessed {
        grayscale,
        numbers_are_lighter,
        threshold: cut,
        binary,
    }
}

/// Debug image sequence number, keeps names unique within a millisecond.
static DEBUG_SEQ: AtomicU64 = AtomicU64::new(0);

/// Source string → digits, end to end.
#[derive(Clone)]
pub struct CaptchaReader {
    service: OcrService,
    fetcher: Fetcher,
    debug_dir: Option<PathBuf>,
}

impl CaptchaReader {
    pub fn new(service: OcrService, fetcher: Fetcher) -> Self {
        Self {
            service,
            fetcher,
            debug_dir: None,
        }
    }

    /// Saves every binarized image into `dir`.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// Reads the digits of the CAPTCHA named by `input`.
    ///
    /// Fails fast with `OcrUnavailable` while the engine is initializing,
    /// before anything is fetched or decoded.
    pub fn read(&self, input: &str) -> CaptchaResult<String> {
        self.service.ensure_ready()?;

        let bytes = ImageSource::parse(input)?.into_bytes(&self.fetcher)?;
        let img = decode_image(&bytes)?;
        let preprocessed = preprocess_captcha(&img)?;
        let png = binarize::encode_png(&preprocessed.binary)?;

        if let Some(dir) = &self.debug_dir {
            self.save_debug_image(dir, &png);
        }

        let output = self.service.recognize(png)?;
        let digits = extract_digits(&output.text);
        debug!(
            "OCR read {:?} (confidence {:.0}%) -> {:?}",
            output.text, output.confidence, digits
        );

        Ok(digits)
    }

    fn save_debug_image(&self, dir: &std::path::Path, png: &[u8]) {
        let seq = DEBUG_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "captcha_{}_{:04}.png",
            Local::now().format("%Y%m%d_%H%M%S%.3f"),
            seq
        );
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, png) {
            warn!("Failed to save debug image {}: {}", path.display(), e);
        }
    }
}
