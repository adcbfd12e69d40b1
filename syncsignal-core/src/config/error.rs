//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A single setting (usually from the environment) did not parse
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Settings parsed but contradict each other or are out of range
    #[error("Invalid configuration: {0}")]
    ValidationFailed(String),
}
