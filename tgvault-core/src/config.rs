//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tgvault/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tgvault/` (~/.config/tgvault/)
//! - Data: `$XDG_DATA_HOME/tgvault/` (~/.local/share/tgvault/)
//! - State/Logs: `$XDG_STATE_HOME/tgvault/` (~/.local/state/tgvault/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Platform API credentials (optional; env vars take precedence)
    #[serde(default)]
    pub api: Option<ApiConfig>,

    /// Export tuning
    #[serde(default)]
    pub export: ExportConfig,

    /// Remote pull pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Local archive backend
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform application credentials.
///
/// The actual sign-in handshake (phone/code/2FA) belongs to the
/// platform adapter; tgvault only stores and hands over the app
/// credentials, the way the original desktop app kept them in its
/// config file.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub api_id: i32,
    pub api_hash: String,
}

impl ApiConfig {
    /// Credentials from `TGVAULT_API_ID` / `TGVAULT_API_HASH`, if both
    /// are set and well-formed. Environment beats the config file.
    pub fn from_env() -> Option<Self> {
        let api_id = std::env::var("TGVAULT_API_ID").ok()?.parse().ok()?;
        let api_hash = std::env::var("TGVAULT_API_HASH").ok()?;
        if api_hash.is_empty() {
            return None;
        }
        Some(Self { api_id, api_hash })
    }
}

/// Export writer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Word budget per export file
    #[serde(default = "default_words_per_file")]
    pub words_per_file: u64,

    /// Persist the checkpoint every N processed messages
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,

    /// Root directory for per-chat export folders.
    /// Defaults to `$XDG_DATA_HOME/tgvault/exports`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            words_per_file: default_words_per_file(),
            checkpoint_every: default_checkpoint_every(),
            output_dir: None,
        }
    }
}

fn default_words_per_file() -> u64 {
    50_000
}

fn default_checkpoint_every() -> u64 {
    50
}

/// Rate-limit pacing for the paginated message source
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PacingConfig {
    /// Pause after every this many messages
    #[serde(default = "default_delay_messages_chunk")]
    pub delay_messages_chunk: u64,

    /// Pause duration in seconds
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay_messages_chunk: default_delay_messages_chunk(),
            delay_seconds: default_delay_seconds(),
        }
    }
}

fn default_delay_messages_chunk() -> u64 {
    1000
}

fn default_delay_seconds() -> f64 {
    1.0
}

/// Local archive backend configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ArchiveConfig {
    /// Directory holding `dialogs.json` and per-chat `<id>.jsonl`
    /// message files
    pub root: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Effective API credentials: environment first, then config file.
    pub fn api_credentials(&self) -> Option<ApiConfig> {
        ApiConfig::from_env().or_else(|| self.api.clone())
    }

    /// Effective exports root directory.
    pub fn exports_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("exports"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tgvault/config.toml` (~/.config/tgvault/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tgvault").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database and exports)
    ///
    /// `$XDG_DATA_HOME/tgvault/` (~/.local/share/tgvault/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("tgvault")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tgvault/` (~/.local/state/tgvault/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tgvault")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/tgvault/tgvault.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("tgvault.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tgvault/tgvault.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tgvault.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path
    /// behavior before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
