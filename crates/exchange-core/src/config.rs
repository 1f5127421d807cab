//! Configuration for the exchange.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $EXCHANGE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/exchange/config.toml
//!   3. ~/.config/exchange/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub wants: WantsConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WantsConfig {
    /// Interval between full want-list resends to every peer.
    pub rebroadcast_interval_ms: u64,
    /// Priority given to the first id of a want request. Each following id
    /// gets one less, bottoming out at `i32::MIN`: in a request longer than
    /// the range below `max_priority`, the trailing ids share that priority.
    pub max_priority: i32,
    /// Capacity of the coordinator's event channel.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bound on connecting to a peer, covering lookup, dial and handshake.
    pub connect_timeout_ms: u64,
    /// Pause before reopening a sender after a failed send.
    pub retry_delay_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for WantsConfig {
    fn default() -> Self {
        Self {
            rebroadcast_interval_ms: 60_000,
            max_priority: i32::MAX,
            event_buffer: 10,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10 * 60 * 1000,
            retry_delay_ms: 100,
        }
    }
}

impl WantsConfig {
    pub fn rebroadcast_interval(&self) -> Duration {
        Duration::from_millis(self.rebroadcast_interval_ms.max(1))
    }
}

impl QueueConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("exchange")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ExchangeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path, falling back to defaults if it is missing.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            ExchangeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("EXCHANGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ExchangeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply EXCHANGE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("EXCHANGE_WANTS__REBROADCAST_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.wants.rebroadcast_interval_ms = v;
        }
        if let Some(v) = lookup("EXCHANGE_WANTS__MAX_PRIORITY").and_then(|v| v.parse().ok()) {
            self.wants.max_priority = v;
        }
        if let Some(v) = lookup("EXCHANGE_WANTS__EVENT_BUFFER").and_then(|v| v.parse().ok()) {
            self.wants.event_buffer = v;
        }
        if let Some(v) = lookup("EXCHANGE_QUEUE__CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.queue.connect_timeout_ms = v;
        }
        if let Some(v) = lookup("EXCHANGE_QUEUE__RETRY_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.queue.retry_delay_ms = v;
        }
    }
}
