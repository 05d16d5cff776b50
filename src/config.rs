//! Runtime configuration.
//!
//! Loads settings from config.json next to the executable at startup. Every
//! field has a default, so a missing or partial file is fine. The pipeline's
//! geometry (resize width, ROI fractions) is fixed and not read from here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level for this crate (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Number of independently initialized OCR engines (one recognition each at a time)
    #[serde(default = "default_ocr_workers")]
    pub ocr_workers: usize,
    /// Explicit path to the tesseract executable
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    /// Tesseract language model
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
    /// Tesseract page segmentation mode (7 = single text line)
    #[serde(default = "default_page_segmentation_mode")]
    pub page_segmentation_mode: u8,
    /// Timeout for fetching remote images (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Download the language model when no tessdata directory has it
    #[serde(default = "default_download_tessdata")]
    pub download_tessdata: bool,
    /// Save every binarized image under `<exe_dir>/debug/`
    #[serde(default)]
    pub debug_output: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ocr_workers() -> usize {
    1
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_page_segmentation_mode() -> u8 {
    7
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_download_tessdata() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ocr_workers: default_ocr_workers(),
            tesseract_path: None,
            tessdata_dir: None,
            ocr_language: default_ocr_language(),
            page_segmentation_mode: default_page_segmentation_mode(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            download_tessdata: default_download_tessdata(),
            debug_output: false,
        }
    }
}

/// Outcome of loading config.json, reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigStatus {
    Loaded(PathBuf),
    Missing(PathBuf),
    Invalid(PathBuf, String),
}

/// Loads configuration from `path`, falling back to defaults.
pub fn load_config_from(path: &Path) -> (AppConfig, ConfigStatus) {
    if !path.exists() {
        return (AppConfig::default(), ConfigStatus::Missing(path.to_path_buf()));
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|contents| {
            serde_json::from_str::<AppConfig>(&contents).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(config) => (config, ConfigStatus::Loaded(path.to_path_buf())),
        Err(reason) => (
            AppConfig::default(),
            ConfigStatus::Invalid(path.to_path_buf(), reason),
        ),
    }
}

fn config_path() -> PathBuf {
    crate::paths::get_exe_dir().join("config.json")
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() -> ConfigStatus {
    let (config, status) = load_config_from(&config_path());
    let _ = CONFIG.set(config);
    status
}

/// Returns the global configuration, loading it on first use.
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(|| load_config_from(&config_path()).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (config, status) = load_config_from(&path);

        assert_eq!(status, ConfigStatus::Missing(path));
        assert_eq!(config.ocr_workers, 1);
        assert_eq!(config.page_segmentation_mode, 7);
        assert_eq!(config.ocr_language, "eng");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"ocr_workers": 4, "debug_output": true}"#).unwrap();

        let (config, status) = load_config_from(&path);

        assert_eq!(status, ConfigStatus::Loaded(path));
        assert_eq!(config.ocr_workers, 4);
        assert!(config.debug_output);
        assert_eq!(config.fetch_timeout_secs, 15);
        assert!(config.download_tessdata);
        assert!(config.tesseract_path.is_none());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let (config, status) = load_config_from(&path);

        assert!(matches!(status, ConfigStatus::Invalid(_, _)));
        assert_eq!(config.log_level, "info");
    }
}
