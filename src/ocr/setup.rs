use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::paths::get_local_tessdata_dir;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Common install locations when tesseract is not on PATH.
const COMMON_EXECUTABLES: [&str; 4] = [
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/opt/homebrew/bin/tesseract",
    "/usr/local/bin/tesseract",
];

/// Common tessdata locations across platforms and package layouts.
const SYSTEM_TESSDATA: [&str; 7] = [
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];

#[derive(Debug, Clone)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets tesseract use its compiled-in default
    pub tessdata: Option<PathBuf>,
}

/// Locates (and if needed completes) a working Tesseract installation.
///
/// This is the slow part of OCR start-up: it may download the language
/// model. Any error here means OCR can never work in this process.
pub fn ensure_tesseract(config: &AppConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
    let version = tesseract_version(&executable)?;
    info!("Using {} ({})", executable.display(), version);

    let language = config.ocr_language.as_str();
    let tessdata = match find_tessdata_dir(config.tessdata_dir.as_deref(), language) {
        Some(dir) => Some(dir),
        None if config.download_tessdata => {
            let dir = get_local_tessdata_dir();
            download_tessdata(&dir, language)?;
            Some(dir)
        }
        None => {
            warn!(
                "No tessdata directory with {}.traineddata found, relying on tesseract's default",
                language
            );
            None
        }
    };

    if let Some(dir) = &tessdata {
        info!("Using tessdata at: {}", dir.display());
    }

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Runs `tesseract --version` and returns its first line.
fn tesseract_version(executable: &Path) -> Result<String> {
    let output = Command::new(executable)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {}", executable.display()))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{} --version exited with {}",
            executable.display(),
            output.status
        ));
    }

    // Older builds print the banner on stderr
    let banner = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Ok(String::from_utf8_lossy(&banner)
        .lines()
        .next()
        .unwrap_or("unknown version")
        .trim()
        .to_string())
}

/// Finds the Tesseract executable: configured path, then PATH, then common locations.
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured tesseract_path {} does not exist", path.display());
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    COMMON_EXECUTABLES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory containing `<language>.traineddata`.
pub fn find_tessdata_dir(configured: Option<&Path>, language: &str) -> Option<PathBuf> {
    let model = format!("{}.traineddata", language);

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = configured {
        candidates.push(dir.to_path_buf());
    }
    candidates.push(get_local_tessdata_dir());
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        candidates.push(PathBuf::from(&prefix));
        candidates.push(PathBuf::from(&prefix).join("tessdata"));
    }
    candidates.extend(SYSTEM_TESSDATA.iter().map(PathBuf::from));

    candidates.into_iter().find(|dir| dir.join(&model).exists())
}

/// Downloads `<language>.traineddata` into `tessdata_dir`.
///
/// The file is written to a temporary name and renamed into place, so an
/// interrupted download never leaves a truncated model behind.
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    let target = tessdata_dir.join(format!("{}.traineddata", language));

    info!("Downloading {}.traineddata...", language);
    fs::create_dir_all(tessdata_dir)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "captcha-ocr")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = NamedTempFile::new_in(tessdata_dir)?;
    file.write_all(&bytes)?;
    file.persist(&target)
        .map_err(|e| anyhow!("Failed to store {}: {}", target.display(), e))?;

    info!(
        "Downloaded {}.traineddata ({} bytes)",
        language,
        bytes.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_configured_tessdata_dir_wins() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("xyz.traineddata"), b"model").unwrap();

        let found = find_tessdata_dir(Some(dir.path()), "xyz");
        assert_eq!(found, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_tessdata_dir_requires_the_language_model() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("eng.traineddata"), b"model").unwrap();

        // No directory anywhere ships this made-up language
        assert_eq!(find_tessdata_dir(Some(dir.path()), "zz-no-such-lang"), None);
    }

    #[test]
    fn test_configured_executable_is_used_when_present() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("tesseract");
        fs::write(&exe, b"").unwrap();

        assert_eq!(find_tesseract_executable(Some(&exe)).unwrap(), exe);
    }
}
