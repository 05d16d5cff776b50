//! Numeric CAPTCHA reader.
//!
//! Normalizes a CAPTCHA image into a clean binary bitmap (fixed-width
//! resize, sharpen, median denoise, polarity detection, Otsu threshold) and
//! reads its digits with Tesseract.

pub mod config;
pub mod error;
pub mod ocr;
pub mod paths;
pub mod source;

pub use error::{CaptchaError, CaptchaResult};
pub use ocr::{CaptchaReader, OcrService, Preprocessed, Readiness, preprocess_captcha};
