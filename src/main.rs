//! captcha-ocr
//!
//! Reads numeric CAPTCHAs. Each argument is either an inline
//! `data:image/...;base64,` payload or an http(s) URL; one JSON line is
//! printed per argument, in order.

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use captcha_ocr::config::{self, AppConfig, ConfigStatus};
use captcha_ocr::ocr::{TesseractEngine, ensure_tesseract};
use captcha_ocr::source::{self, Fetcher};
use captcha_ocr::{CaptchaReader, OcrService, Readiness, paths};

/// One output line.
#[derive(Debug, Serialize)]
struct Report {
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    digits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

/// Sets up console and file logging with local timestamps.
fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_env("CAPTCHA_OCR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("captcha_ocr={}", config.log_level)));
    let timer = ChronoLocal::new("%H:%M:%S%.3f".to_string());

    let log_path = paths::get_logs_dir().join("captcha_ocr.log");
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(timer.clone())
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        eprintln!("[PANIC]{} {}", location, msg);
        error!("[PANIC]{} {}", location, msg);
    }));
}

/// Short label for a source; inline payloads are not echoed.
fn source_label(input: &str) -> String {
    if source::is_inline(input) {
        "inline".to_string()
    } else {
        input.to_string()
    }
}

fn read_one(reader: &CaptchaReader, input: &str) -> Report {
    let source = source_label(input);
    match reader.read(input) {
        Ok(digits) => {
            info!("{}: read {:?}", source, digits);
            Report {
                source,
                digits: Some(digits),
                error: None,
                category: None,
                retryable: false,
            }
        }
        Err(e) => {
            warn!(category = e.category(), "{}: processing failed: {}", source, e);
            Report {
                source,
                digits: None,
                error: Some("processing failed"),
                category: Some(e.category()),
                retryable: e.is_retryable(),
            }
        }
    }
}

fn main() -> Result<()> {
    install_panic_hook();

    let status = config::init_config();
    let config = config::get_config();

    paths::ensure_directories(config.debug_output)?;
    init_logging(config)?;

    match &status {
        ConfigStatus::Loaded(path) => info!("Config loaded from {}", path.display()),
        ConfigStatus::Missing(path) => info!("{} not found. Using default config.", path.display()),
        ConfigStatus::Invalid(path, reason) => {
            warn!("Failed to parse {}: {}. Using defaults.", path.display(), reason)
        }
    }

    let sources: Vec<String> = std::env::args().skip(1).collect();
    if sources.is_empty() {
        eprintln!("usage: captcha-ocr <data:image/...;base64,... | http(s)://...>...");
        std::process::exit(2);
    }

    let engine_config = config.clone();
    let service = OcrService::start(move || {
        let paths = ensure_tesseract(&engine_config)?;
        Ok((0..engine_config.ocr_workers.max(1))
            .map(|_| TesseractEngine::new(paths.clone(), &engine_config))
            .collect::<Vec<_>>())
    });

    // A one-shot CLI has nothing better to do than wait for the engine
    if service.wait() != Readiness::Ready {
        let reason = service
            .ensure_ready()
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        error!("OCR engine unavailable, exiting: {}", reason);
        return Err(anyhow!("OCR engine initialization failed: {}", reason));
    }

    let fetcher = Fetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let mut reader = CaptchaReader::new(service, fetcher);
    if config.debug_output {
        reader = reader.with_debug_dir(paths::get_debug_dir());
    }

    // Requests are independent; only the OCR pool is shared
    let reports: Vec<Report> = thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|input| {
                let reader = &reader;
                scope.spawn(move || read_one(reader, input))
            })
            .collect();
        handles
            .into_iter()
            .zip(&sources)
            .map(|(handle, input)| {
                handle.join().unwrap_or_else(|_| Report {
                    source: source_label(input),
                    digits: None,
                    error: Some("processing failed"),
                    category: Some("panic"),
                    retryable: false,
                })
            })
            .collect()
    });

    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }

    Ok(())
}
