/*
    types.rs - Common types shared across the engine

    Defines:
    - Timestamps (wall-clock milliseconds)
    - Flavors (scalar vs structured namespaces)
    - Context identifiers
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key prefix (and channel prefix) of scalar units
pub const SCALAR_PREFIX: &str = "syncsignal";

/// Key prefix (and channel prefix) of structured units
pub const STRUCTURE_PREFIX: &str = "syncstore";

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a timestamp representing the current wall-clock time
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis())
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which namespace a unit lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// A single value (`syncsignal-*`)
    Scalar,
    /// A nested, path-addressable value (`syncstore-*`)
    #[default]
    Structure,
}

impl Flavor {
    pub fn prefix(&self) -> &'static str {
        match self {
            Flavor::Scalar => SCALAR_PREFIX,
            Flavor::Structure => STRUCTURE_PREFIX,
        }
    }

    /// Store key and channel name for `key` in this namespace
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}-{}", self.prefix(), key)
    }

    /// Inverse of [`Flavor::storage_key`]
    pub fn strip_prefix<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key
            .strip_prefix(self.prefix())
            .and_then(|rest| rest.strip_prefix('-'))
    }

    pub fn all() -> [Flavor; 2] {
        [Flavor::Scalar, Flavor::Structure]
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Scalar => write!(f, "scalar"),
            Flavor::Structure => write!(f, "structure"),
        }
    }
}

impl std::str::FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scalar" | "signal" => Ok(Flavor::Scalar),
            "structure" | "store" => Ok(Flavor::Structure),
            other => Err(format!("unknown flavor: {}", other)),
        }
    }
}

/// Identity of one execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn generate() -> Self {
        ContextId(Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
