//! Tracing setup: console on stderr plus an optional append-only log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, at process start.
///
/// `RUST_LOG` wins over `logging.level`. When `log_file` is set, events are
/// also appended there, as JSON lines if `logging.json` is on.
pub fn init(logging: &LoggingConfig, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create log dir: {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            Some(Mutex::new(file))
        }
        None => None,
    };

    let (plain_file, json_file) = match file {
        Some(f) if logging.json => (None, Some(f)),
        Some(f) => (Some(f), None),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(plain_file.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
        .with(json_file.map(|w| fmt::layer().json().with_writer(w)))
        .try_init()
        .context("tracing subscriber already installed")?;

    if let Some(path) = log_file {
        tracing::info!(path = %path.display(), "logging to file");
    }
    Ok(())
}
