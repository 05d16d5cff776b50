use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::TesseractPaths;
use crate::config::AppConfig;

/// Characters Tesseract is allowed to emit.
const DIGIT_WHITELIST: &str = "0123456789";

/// What the engine read from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Raw recognized text, before digit filtering
    pub text: String,
    /// Mean word confidence (0-100), or 0 when nothing was read
    pub confidence: f32,
}

/// An OCR engine instance.
///
/// Engines are not assumed to be safe for concurrent use; the service gives
/// each worker thread its own instance.
pub trait OcrEngine: Send {
    /// Recognizes text in a PNG-encoded, single-channel binary image.
    fn recognize(&mut self, png: &[u8]) -> Result<OcrOutput>;
}

/// Runs the Tesseract CLI, restricted to digits.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    language: String,
    page_segmentation_mode: u8,
}

impl TesseractEngine {
    pub fn new(paths: TesseractPaths, config: &AppConfig) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
            language: config.ocr_language.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
        }
    }

    fn command(&self, input: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_segmentation_mode.to_string());
        if let Some(tessdata) = &self.tessdata {
            cmd.arg("--tessdata-dir").arg(tessdata);
        }
        cmd.arg("-c")
            .arg(format!("tessedit_char_whitelist={}", DIGIT_WHITELIST))
            .arg("tsv");
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, png: &[u8]) -> Result<OcrOutput> {
        // Tesseract reads from a file; stdin support varies between builds
        let mut input = NamedTempFile::with_suffix(".png")?;
        input.write_all(png)?;
        input.flush()?;

        let output = self
            .command(input.path())
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        Ok(parse_tsv_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses Tesseract TSV output into text plus mean word confidence.
///
/// Words on the same line are joined with spaces, lines with newlines.
fn parse_tsv_output(tsv: &str) -> OcrOutput {
    let mut lines: Vec<Vec<&str>> = Vec::new();
    let mut current_line: Option<(i32, i32, i32)> = None;
    let mut conf_sum: f32 = 0.0;
    let mut word_count: usize = 0;

    for row in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // Level 5 = word
        if fields[0] != "5" {
            continue;
        }

        let text = fields[11].trim();
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_line != Some(key) {
            lines.push(Vec::new());
            current_line = Some(key);
        }
        if let Some(words) = lines.last_mut() {
            words.push(text);
        }

        conf_sum += conf;
        word_count += 1;
    }

    let text = lines
        .iter()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    let confidence = if word_count > 0 {
        conf_sum / word_count as f32
    } else {
        0.0
    };

    OcrOutput { text, confidence }
}
