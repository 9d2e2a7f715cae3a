//! TOML configuration for the tracker.
//!
//! One file drives both commands: which network this host belongs to, where
//! each task's logs live, where to write our own logs, who to alert when
//! Lochness goes quiet, and which spreadsheet backend to use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "AV_TRACKER_CONFIG";

/// File name looked up at the repository root when nothing else is given.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config key {section}.{key}")]
    MissingKey { section: &'static str, key: String },

    #[error("missing required config section [{0}]")]
    MissingSection(&'static str),

    #[error("config file not found at {0}")]
    NotFound(PathBuf),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// `{network}_{task}_logs` -> directory holding one subdirectory per site.
    #[serde(default)]
    pub log_source_dir: BTreeMap<String, PathBuf>,
    pub lochness: Option<LochnessConfig>,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

impl TrackerConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find the config file:
    /// 1. `explicit` (the `--config` flag),
    /// 2. the `AV_TRACKER_CONFIG` environment variable,
    /// 3. `config.toml` at the root of the enclosing git checkout.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(p) => PathBuf::from(p),
                None => repo_root()?.join(CONFIG_FILE_NAME),
            },
        };

        if !path.is_file() {
            return Err(ConfigError::NotFound(path).into());
        }
        Ok(path)
    }

    /// Network this host reports for.
    pub fn network(&self) -> Result<&str, ConfigError> {
        self.general
            .network
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                section: "general",
                key: "network".to_string(),
            })
    }

    /// Log directory for one (network, task) pair, keyed
    /// `{network lowercased}_{task}_logs`.
    pub fn network_logs_path(&self, network: &str, task: &str) -> Result<&Path, ConfigError> {
        let key = format!("{}_{}_logs", network.to_lowercase(), task);
        match self.log_source_dir.get(&key) {
            Some(p) => Ok(p.as_path()),
            None => Err(ConfigError::MissingKey {
                section: "log_source_dir",
                key,
            }),
        }
    }

    pub fn lochness(&self) -> Result<&LochnessConfig, ConfigError> {
        self.lochness
            .as_ref()
            .ok_or(ConfigError::MissingSection("lochness"))
    }
}

/// `git rev-parse --show-toplevel` of the working directory.
fn repo_root() -> Result<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .context("failed to run git to locate the repository root")?;
    if !output.status.success() {
        anyhow::bail!(
            "not inside a git checkout; pass --config or set {}",
            CONFIG_ENV
        );
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(root))
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Network name, also the worksheet (tab) name.
    pub network: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Where the tracker writes its own logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Write the file log as JSON lines instead of plain text.
    pub json: bool,
    /// Append-only log file for `track-logs`.
    pub track_logs: Option<PathBuf>,
    /// Append-only log file for `check-lochness`.
    pub track_lochness: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            track_logs: None,
            track_lochness: None,
        }
    }
}

impl LoggingConfig {
    /// Log file for the named command, if one is configured.
    pub fn file_for(&self, command: &str) -> Option<&Path> {
        match command {
            "track_logs" => self.track_logs.as_deref(),
            "track_lochness" => self.track_lochness.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Lochness
// ---------------------------------------------------------------------------

/// Heartbeat alerting for the Lochness sync agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LochnessConfig {
    pub email_sender: String,
    /// Comma-separated list of addresses.
    pub email_recipients: String,
    pub email_threshold_hours: u32,
    /// Mail user agent used to deliver alerts.
    #[serde(default = "default_mail_binary")]
    pub mail_binary: PathBuf,
}

fn default_mail_binary() -> PathBuf {
    PathBuf::from("/usr/bin/mail")
}

impl LochnessConfig {
    pub fn recipients(&self) -> Vec<String> {
        crate::notify::parse_recipients(&self.email_recipients)
    }
}

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetsBackend {
    Local,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub backend: SheetsBackend,
    /// SQLite workbook used by the `local` backend.
    pub local_path: PathBuf,
    /// Spreadsheet id used by the `google` backend.
    pub spreadsheet_id: String,
    /// Environment variable holding the OAuth bearer token.
    pub access_token_env: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            backend: SheetsBackend::Local,
            local_path: PathBuf::from("data/tracker-sheets.db"),
            spreadsheet_id: String::new(),
            access_token_env: "AV_TRACKER_SHEETS_TOKEN".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
