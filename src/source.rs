//! Image source resolution.
//!
//! A request names its image either inline (`data:image/png;base64,...`) or
//! by http(s) URL. This module turns that string into decoded pixels; it does
//! no pixel processing of its own.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::DynamicImage;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::error::{CaptchaError, CaptchaResult, FetchError};

/// `data:image<anything but a comma>;base64,<payload>`
const DATA_URL_PATTERN: &str = r"(?s)^data:image[^,]*;base64,(.+)$";

/// Longest slice of a rejected source echoed back in errors and logs.
const MAX_ECHO_CHARS: usize = 48;

static DATA_URL: OnceLock<Regex> = OnceLock::new();

fn data_url_regex() -> &'static Regex {
    DATA_URL.get_or_init(|| Regex::new(DATA_URL_PATTERN).expect("data URL pattern is valid"))
}

/// True when `input` is an inline `data:image...;base64,` payload.
pub fn is_inline(input: &str) -> bool {
    data_url_regex().is_match(input.trim())
}

/// Where the image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Bytes decoded from an inline base64 payload
    Inline(Vec<u8>),
    /// An http(s) URL to fetch
    Remote(String),
}

impl ImageSource {
    /// Classifies a source string. Anything that is neither an inline image
    /// payload nor an http(s) URL is rejected before any fetching happens.
    pub fn parse(input: &str) -> CaptchaResult<Self> {
        let input = input.trim();

        if let Some(caps) = data_url_regex().captures(input) {
            let payload: String = caps[1]
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            let bytes = STANDARD.decode(payload.as_bytes()).map_err(|e| {
                CaptchaError::InvalidImageSource(format!("inline payload is not base64: {}", e))
            })?;
            return Ok(Self::Inline(bytes));
        }

        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Self::Remote(input.to_string()));
        }

        Err(CaptchaError::InvalidImageSource(echo(input)))
    }

    /// Produces the raw image bytes, fetching them if needed.
    pub fn into_bytes(self, fetcher: &Fetcher) -> CaptchaResult<Vec<u8>> {
        match self {
            Self::Inline(bytes) => Ok(bytes),
            Self::Remote(url) => fetcher.fetch(&url),
        }
    }
}

/// Truncates a rejected input so that huge payloads don't end up in logs.
fn echo(input: &str) -> String {
    if input.chars().count() <= MAX_ECHO_CHARS {
        return input.to_string();
    }
    let head: String = input.chars().take(MAX_ECHO_CHARS).collect();
    format!("{}...", head)
}

/// Blocking HTTP fetcher for remote CAPTCHA images.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("captcha-ocr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `url`; any non-success status is an `ImageFetchFailure`.
    pub fn fetch(&self, url: &str) -> CaptchaResult<Vec<u8>> {
        let failure = |source: FetchError| CaptchaError::ImageFetchFailure {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| failure(FetchError::Transport(e)))?;

        if !response.status().is_success() {
            return Err(failure(FetchError::Status(response.status().as_u16())));
        }

        let bytes = response
            .bytes()
            .map_err(|e| failure(FetchError::Transport(e)))?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Decodes image bytes in any format the `image` crate recognizes.
pub fn decode_image(bytes: &[u8]) -> CaptchaResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| CaptchaError::InvalidImage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = GrayImage::from_pixel(4, 2, Luma([77]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_parse_inline_payload() {
        let bytes = png_bytes();
        let input = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));

        assert_eq!(ImageSource::parse(&input).unwrap(), ImageSource::Inline(bytes));
    }

    #[test]
    fn test_parse_inline_payload_tolerates_line_breaks() {
        let bytes = png_bytes();
        let encoded = STANDARD.encode(&bytes);
        let (head, tail) = encoded.split_at(10);
        let input = format!("data:image/png;base64,{}\n{}", head, tail);

        assert_eq!(ImageSource::parse(&input).unwrap(), ImageSource::Inline(bytes));
    }

    #[test]
    fn test_parse_remote_urls() {
        assert_eq!(
            ImageSource::parse("https://example.com/captcha.png").unwrap(),
            ImageSource::Remote("https://example.com/captcha.png".to_string())
        );
        assert_eq!(
            ImageSource::parse("  HTTP://example.com/c  ").unwrap(),
            ImageSource::Remote("HTTP://example.com/c".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_other_sources() {
        for input in ["ftp://example.com/c.png", "/tmp/c.png", "", "data:text/plain;base64,aGk="] {
            let err = ImageSource::parse(input).unwrap_err();
            assert!(
                matches!(err, CaptchaError::InvalidImageSource(_)),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_is_inline_matches_what_parse_accepts() {
        assert!(is_inline("  data:image/png;base64,AAAA"));
        assert!(!is_inline("data:text/plain;base64,aGk="));
        assert!(!is_inline("https://example.com/c.png"));
        assert!(!is_inline("data:image/png,rawbytes"));
    }

    #[test]
    fn test_parse_rejects_broken_base64() {
        let err = ImageSource::parse("data:image/png;base64,@@@@").unwrap_err();
        assert_eq!(err.category(), "invalid_image_source");
    }

    #[test]
    fn test_rejected_source_is_truncated() {
        let long = "x".repeat(500);
        match ImageSource::parse(&long).unwrap_err() {
            CaptchaError::InvalidImageSource(echoed) => {
                assert_eq!(echoed.len(), MAX_ECHO_CHARS + 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_image() {
        let img = decode_image(&png_bytes()).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));

        let err = decode_image(b"definitely not an image").unwrap_err();
        assert_eq!(err.category(), "invalid_image");
    }
}
