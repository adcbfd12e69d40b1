//! Scalar sync unit: one observable value, optionally auto-synced

use super::machine::{ApplyOutcome, Lifecycle, Source, UnitCore, UnitEnv, UnitSettings};
use super::options::ScalarOptions;
use crate::cell::{Observable, Subscription};
use crate::codec::SyncValue;
use crate::error::SyncResult;
use crate::types::{Flavor, Timestamp};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Handle to a scalar unit
///
/// Clones share the same unit. The unit tears itself down when the last
/// handle is dropped, or earlier through [`SyncedScalar::teardown`] or the
/// owning context's clear operations.
#[derive(Clone)]
pub struct SyncedScalar {
    core: Arc<UnitCore>,
}

impl SyncedScalar {
    pub(crate) fn create(env: &UnitEnv, initial: SyncValue, options: Option<ScalarOptions>) -> SyncResult<Self> {
        let options = options.unwrap_or_default().normalized();
        let settings = UnitSettings {
            persist_on_load: options.persist_on_load,
            polling_interval: options.polling_interval,
            transport_mode: options.transport_mode,
        };

        let core = UnitCore::start(env, Flavor::Scalar, options.key, initial, settings)?;
        if options.auto_sync {
            core.enable_auto_sync(options.throttle);
        }
        Ok(SyncedScalar { core })
    }

    pub fn key(&self) -> &str {
        self.core.key()
    }

    /// Durable-store key and channel name of this unit
    pub fn storage_key(&self) -> &str {
        self.core.storage_key()
    }

    pub fn get(&self) -> SyncValue {
        self.core.cell().get()
    }

    /// Current value decoded into `T`
    pub fn get_as<T: DeserializeOwned>(&self) -> SyncResult<T> {
        Ok(self.core.cell().with(|value| value.deserialize_into())?)
    }

    /// Replace the local value. Pushed out only by auto-sync or [`SyncedScalar::sync`].
    pub fn set(&self, value: impl Into<SyncValue>) {
        self.core.cell().set(value.into());
    }

    pub fn update(&self, f: impl FnOnce(&SyncValue) -> SyncValue) {
        self.core.cell().update(f);
    }

    /// Push the current value to every other context now
    pub fn sync(&self) {
        self.core.sync_now();
    }

    /// Observe changes, local and remote alike
    pub fn subscribe(&self, callback: impl Fn(&SyncValue) + Send + Sync + 'static) -> Subscription {
        self.core.cell().subscribe(callback)
    }

    /// The underlying cell, for binding into a UI layer
    pub fn observable(&self) -> Observable<SyncValue> {
        self.core.cell().clone()
    }

    /// Apply an envelope that arrived outside the built-in transports
    ///
    /// Same rules as any incoming payload: it must decode and carry a
    /// timestamp above the watermark.
    pub fn apply_payload(&self, payload: &str) -> ApplyOutcome {
        self.core.apply_incoming(payload, Source::External)
    }

    pub fn watermark(&self) -> Timestamp {
        self.core.watermark()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.core.lifecycle()
    }

    /// Stop syncing. The local value stays readable and writable.
    pub fn teardown(&self) {
        self.core.teardown();
    }
}

impl fmt::Debug for SyncedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedScalar")
            .field("key", &self.key())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
