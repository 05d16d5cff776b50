// Error taxonomy for the CAPTCHA reader.
//
// Every per-request failure is a `CaptchaError`; callers log `category()` and
// report a generic failure. Engine and setup internals use anyhow and are
// folded into the OCR variants at the service boundary.

use thiserror::Error;

/// Why a remote image could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    /// Input is neither an inline `data:image...;base64,` payload nor an http(s) URL.
    #[error("Unsupported image source: {0}")]
    InvalidImageSource(String),

    #[error("Image fetch from {url} failed: {source}")]
    ImageFetchFailure {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Undecodable bytes or a zero-sized raster.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Failed to encode binarized image: {0}")]
    EncodingFailure(#[source] image::ImageError),

    /// The OCR engine is still initializing. Retry later.
    #[error("OCR engine is not ready yet")]
    OcrUnavailable,

    /// The OCR engine could not be initialized (or its workers are gone).
    #[error("OCR engine failure: {0}")]
    OcrEngineFailure(String),

    /// The engine was up but failed on this particular image.
    #[error("Recognition failed: {0}")]
    RecognitionFailure(String),
}

impl CaptchaError {
    /// Stable identifier used in logs and report lines.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidImageSource(_) => "invalid_image_source",
            Self::ImageFetchFailure { .. } => "image_fetch_failure",
            Self::InvalidImage(_) => "invalid_image",
            Self::EncodingFailure(_) => "encoding_failure",
            Self::OcrUnavailable => "ocr_unavailable",
            Self::OcrEngineFailure(_) => "ocr_engine_failure",
            Self::RecognitionFailure(_) => "recognition_failure",
        }
    }

    /// True when the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OcrUnavailable => true,
            Self::ImageFetchFailure { source, .. } => match source {
                FetchError::Transport(_) => true,
                FetchError::Status(status) => *status >= 500 || *status == 429,
            },
            _ => false,
        }
    }
}

pub type CaptchaResult<T> = Result<T, CaptchaError>;
