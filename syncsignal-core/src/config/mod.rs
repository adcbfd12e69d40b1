//! Configuration for syncsignal
//!
//! Defaults, a TOML file, or `SYNCSIGNAL_*` environment variables. The
//! `sync` section seeds unit options; explicit options passed at unit
//! construction always win.

use crate::logging::{LogConfig, LogLevel};
use crate::transport::TransportMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied to units created from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Auto-sync throttle window
    #[serde(with = "humantime_serde")]
    pub throttle: Duration,

    /// Polling fallback interval; absent means no polling
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<Duration>,

    pub transport_mode: TransportMode,

    pub persist_on_load: bool,
}

/// Which durable backend an origin uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(ConfigError::InvalidValue(format!("Unknown store backend: {}", other))),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,

    /// Database file, required for the sqlite backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(50),
            polling_interval: None,
            transport_mode: TransportMode::BroadcastPreferred,
            persist_on_load: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Subscriber settings for [`crate::logging::init_logging_with_config`]
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level: LogLevel = self
            .level
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("Invalid log level: {}", self.level)))?;
        Ok(LogConfig {
            level,
            json_format: self.json_format,
            with_timestamp: self.with_timestamp,
            with_target: self.with_target,
        })
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    raw.parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e)))
}

fn parse_millis(name: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", name, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow `SYNCSIGNAL_<SECTION>_<KEY>`, for example
    /// `SYNCSIGNAL_SYNC_THROTTLE_MS=100` or `SYNCSIGNAL_STORE_BACKEND=sqlite`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("SYNCSIGNAL_SYNC_THROTTLE_MS") {
            config.sync.throttle = parse_millis("throttle", &raw)?;
        }
        if let Ok(raw) = env::var("SYNCSIGNAL_SYNC_POLLING_INTERVAL_MS") {
            config.sync.polling_interval = Some(parse_millis("polling interval", &raw)?);
        }
        if let Ok(raw) = env::var("SYNCSIGNAL_SYNC_TRANSPORT_MODE") {
            config.sync.transport_mode = raw.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Ok(raw) = env::var("SYNCSIGNAL_SYNC_PERSIST_ON_LOAD") {
            config.sync.persist_on_load = parse_bool("persist-on-load flag", &raw)?;
        }

        if let Ok(raw) = env::var("SYNCSIGNAL_STORE_BACKEND") {
            config.store.backend = raw.parse()?;
        }
        if let Ok(path) = env::var("SYNCSIGNAL_STORE_PATH") {
            config.store.path = Some(PathBuf::from(path));
        }

        if let Ok(level) = env::var("SYNCSIGNAL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(raw) = env::var("SYNCSIGNAL_LOG_JSON") {
            config.logging.json_format = parse_bool("JSON flag", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.throttle.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "sync.throttle must be greater than 0".to_string(),
            ));
        }

        if self.sync.polling_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::ValidationFailed(
                "sync.polling_interval must be greater than 0".to_string(),
            ));
        }

        if self.store.backend == BackendKind::Sqlite
            && self.store.path.as_ref().map_or(true, |p| p.as_os_str().is_empty())
        {
            return Err(ConfigError::ValidationFailed(
                "sqlite store requires store.path".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
