//! Per-context registry of live sync units
//!
//! Two namespaces, one per [`Flavor`]. Each live unit owns one entry keyed
//! by its logical key; the entry exposes the unit's sync trigger and its
//! teardown so the facade can reach units it holds no handle to.
//!
//! The registry never calls into units while its own lock is held.

use crate::error::{SyncError, SyncResult};
use crate::types::Flavor;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Pushes the unit's current value to the other contexts
pub type SyncTrigger = Arc<dyn Fn() + Send + Sync>;

/// Stops the unit's listeners and timers
pub type TeardownFn = Arc<dyn Fn() + Send + Sync>;

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for one unit instance
pub(crate) fn next_unit_id() -> u64 {
    NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone)]
pub struct RegistryEntry {
    unit_id: u64,
    pub sync: SyncTrigger,
    pub teardown: TeardownFn,
}

impl RegistryEntry {
    pub fn new(sync: SyncTrigger, teardown: TeardownFn) -> Self {
        Self::for_unit(next_unit_id(), sync, teardown)
    }

    pub(crate) fn for_unit(unit_id: u64, sync: SyncTrigger, teardown: TeardownFn) -> Self {
        RegistryEntry {
            unit_id,
            sync,
            teardown,
        }
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry").field("unit_id", &self.unit_id).finish()
    }
}

#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<(Flavor, String), RegistryEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(Flavor, String), RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry. Fails if a live unit already owns the key.
    pub fn register(&self, flavor: Flavor, key: &str, entry: RegistryEntry) -> SyncResult<()> {
        let mut entries = self.lock();
        let slot = (flavor, key.to_string());
        if entries.contains_key(&slot) {
            return Err(SyncError::KeyInUse(flavor.storage_key(key)));
        }
        debug!(flavor = %flavor, key, unit = entry.unit_id, "Registered sync unit");
        entries.insert(slot, entry);
        Ok(())
    }

    pub fn get(&self, flavor: Flavor, key: &str) -> Option<RegistryEntry> {
        self.lock().get(&(flavor, key.to_string())).cloned()
    }

    pub fn sync_trigger(&self, flavor: Flavor, key: &str) -> Option<SyncTrigger> {
        self.get(flavor, key).map(|entry| entry.sync)
    }

    pub fn contains(&self, flavor: Flavor, key: &str) -> bool {
        self.lock().contains_key(&(flavor, key.to_string()))
    }

    /// Remove whatever entry holds the key
    pub fn remove(&self, flavor: Flavor, key: &str) -> Option<RegistryEntry> {
        self.lock().remove(&(flavor, key.to_string()))
    }

    /// Remove the entry only if it still belongs to `unit_id`
    pub(crate) fn deregister(&self, flavor: Flavor, key: &str, unit_id: u64) -> bool {
        let mut entries = self.lock();
        let slot = (flavor, key.to_string());
        match entries.get(&slot) {
            Some(entry) if entry.unit_id == unit_id => {
                entries.remove(&slot);
                debug!(flavor = %flavor, key, unit = unit_id, "Deregistered sync unit");
                true
            }
            _ => false,
        }
    }

    /// Registered keys in one namespace, sorted
    pub fn keys(&self, flavor: Flavor) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|(f, _)| *f == flavor)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of every entry, for callers that must not hold the lock
    pub fn entries(&self) -> Vec<(Flavor, String, RegistryEntry)> {
        self.lock()
            .iter()
            .map(|((flavor, key), entry)| (*flavor, key.clone(), entry.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
