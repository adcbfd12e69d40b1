//! Construction options for sync units

use crate::codec::SyncValue;
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::transport::TransportMode;
use std::time::Duration;
use tracing::warn;

/// Key used by scalar units that are not given one
pub const DEFAULT_SCALAR_KEY: &str = "default";

/// Default auto-sync throttle window
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(50);

/// Options for [`crate::SyncedScalar`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarOptions {
    /// Logical name, unique per context among scalar units
    pub key: String,
    /// Push every local change automatically (throttled)
    pub auto_sync: bool,
    /// Trailing-edge delay between the first change and the push
    pub throttle: Duration,
    /// Poll the durable entry as a last resort. `None` disables polling.
    pub polling_interval: Option<Duration>,
    /// Write the initial value out when nothing was stored yet
    pub persist_on_load: bool,
    pub transport_mode: TransportMode,
}

impl Default for ScalarOptions {
    fn default() -> Self {
        ScalarOptions {
            key: DEFAULT_SCALAR_KEY.to_string(),
            auto_sync: false,
            throttle: DEFAULT_THROTTLE,
            polling_interval: None,
            persist_on_load: true,
            transport_mode: TransportMode::default(),
        }
    }
}

impl ScalarOptions {
    pub fn new(key: impl Into<String>) -> Self {
        ScalarOptions {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Options seeded from configured defaults
    pub fn from_settings(key: impl Into<String>, settings: &SyncSettings) -> Self {
        ScalarOptions {
            key: key.into(),
            auto_sync: false,
            throttle: settings.throttle,
            polling_interval: settings.polling_interval,
            persist_on_load: settings.persist_on_load,
            transport_mode: settings.transport_mode,
        }
    }

    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn polling(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    pub fn persist_on_load(mut self, persist: bool) -> Self {
        self.persist_on_load = persist;
        self
    }

    pub fn transport_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = mode;
        self
    }

    /// Scalar units are lenient: bad values fall back with a warning
    pub(crate) fn normalized(mut self) -> Self {
        if self.key.trim().is_empty() {
            warn!(fallback = DEFAULT_SCALAR_KEY, "Scalar unit created with an empty key");
            self.key = DEFAULT_SCALAR_KEY.to_string();
        }
        if self.polling_interval == Some(Duration::ZERO) {
            warn!(key = %self.key, "Zero polling interval ignored; polling disabled");
            self.polling_interval = None;
        }
        self
    }
}

/// Options for [`crate::SyncedStructure`]
#[derive(Debug, Clone, PartialEq)]
pub struct StructureOptions {
    /// Logical name, required and unique per context among structured units
    pub key: String,
    pub initial_value: SyncValue,
    pub persist_on_load: bool,
    pub polling_interval: Option<Duration>,
    pub transport_mode: TransportMode,
}

impl StructureOptions {
    pub fn new(key: impl Into<String>, initial_value: impl Into<SyncValue>) -> Self {
        StructureOptions {
            key: key.into(),
            initial_value: initial_value.into(),
            persist_on_load: true,
            polling_interval: None,
            transport_mode: TransportMode::default(),
        }
    }

    pub fn from_settings(
        key: impl Into<String>,
        initial_value: impl Into<SyncValue>,
        settings: &SyncSettings,
    ) -> Self {
        StructureOptions {
            key: key.into(),
            initial_value: initial_value.into(),
            persist_on_load: settings.persist_on_load,
            polling_interval: settings.polling_interval,
            transport_mode: settings.transport_mode,
        }
    }

    pub fn persist_on_load(mut self, persist: bool) -> Self {
        self.persist_on_load = persist;
        self
    }

    pub fn polling(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    pub fn transport_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = mode;
        self
    }

    /// Structured units are strict: a missing key is a caller bug
    pub(crate) fn validate(&self) -> SyncResult<()> {
        if self.key.trim().is_empty() {
            return Err(SyncError::Config("structured unit requires a non-empty key".to_string()));
        }
        if self.polling_interval == Some(Duration::ZERO) {
            return Err(SyncError::Config(format!(
                "polling interval for '{}' must be greater than zero",
                self.key
            )));
        }
        Ok(())
    }
}
