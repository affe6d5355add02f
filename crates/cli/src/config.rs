//! Configuration loading from lockkeeper.toml.

use approval::Policy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "lockkeeper.toml";
const CONFIG_ENV: &str = "LOCKKEEPER_CONFIG";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Policy rules (allow/deny).
    #[serde(flatten)]
    pub policy: Policy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    /// Canned replies; runs offline.
    Scripted,
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_model")]
    pub model: String,

    /// Anthropic API key; falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,

    pub base_url: Option<String>,

    pub max_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_tokens: None,
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding checkpoints and the approval ledger.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Local SQLite ledger, decided with `lockkeeper decide`.
    #[default]
    Ledger,
    /// Remote function-call approval service.
    Http,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub gateway: GatewayKind,

    /// Approval service URL (http gateway only).
    pub base_url: Option<String>,

    pub api_key: Option<String>,

    /// Reject requests left undecided this long. Unset: wait indefinitely.
    pub expire_after_secs: Option<u64>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    pub tool_timeout_secs: Option<u64>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayKind::default(),
            base_url: None,
            api_key: None,
            expire_after_secs: None,
            poll_interval_ms: default_poll_interval_ms(),
            tool_timeout_secs: None,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl ApprovalConfig {
    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `LOCKKEEPER_CONFIG`, else `./lockkeeper.toml`, else defaults.
    pub fn discover() -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            return Ok((Self::load(&path)?, Some(path)));
        }
        let path = PathBuf::from(CONFIG_FILE);
        if path.exists() {
            return Ok((Self::load(&path)?, Some(path)));
        }
        Ok((Self::default(), None))
    }

    /// The Anthropic API key from config or environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.backend
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Database path, defaulting to the user data directory.
    pub fn database_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| {
            dirs_data_dir()
                .unwrap_or_else(|| ".lockkeeper".into())
                .join("lockkeeper.db")
        })
    }
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/lockkeeper"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("lockkeeper"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("lockkeeper"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("API key not configured: set backend.api_key or ANTHROPIC_API_KEY")]
    MissingApiKey,

    #[error("approval.base_url is required for the http gateway")]
    MissingGatewayUrl,
}
