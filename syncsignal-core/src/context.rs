//! Origins and execution contexts
//!
//! An [`Origin`] is everything contexts share: the durable storage medium
//! and, when supported, a broadcast hub. A [`SyncContext`] is one
//! participant (a tab, a window, a process) with its own identity and its
//! own registry of live units. Contexts never share memory beyond the two
//! transports.

use crate::codec::SyncValue;
use crate::config::{BackendKind, StoreConfig};
use crate::error::{SyncError, SyncResult};
use crate::registry::{Registry, SyncTrigger};
use crate::transport::{
    BroadcastHub, ChannelHandle, DurableStore, MemoryBackend, SqliteBackend, StorageBackend, StorageMedium,
};
use crate::types::{ContextId, Flavor};
use crate::unit::{ScalarOptions, StructureOptions, SyncedScalar, SyncedStructure, UnitEnv};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared transports for a group of contexts
#[derive(Clone)]
pub struct Origin {
    hub: Option<BroadcastHub>,
    storage: StorageMedium,
}

impl Origin {
    /// Origin with a broadcast hub over the given backend
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Origin {
            hub: Some(BroadcastHub::new()),
            storage: StorageMedium::new(backend),
        }
    }

    /// Broadcast hub plus an in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Broadcast hub plus a SQLite store at `path`
    pub fn sqlite(path: impl AsRef<Path>) -> SyncResult<Self> {
        Ok(Self::new(Arc::new(SqliteBackend::open(path)?)))
    }

    pub fn from_config(config: &StoreConfig) -> SyncResult<Self> {
        match config.backend {
            BackendKind::Memory => Ok(Self::in_memory()),
            BackendKind::Sqlite => {
                let path = config
                    .path
                    .as_ref()
                    .ok_or_else(|| SyncError::Config("sqlite store requires a path".to_string()))?;
                Self::sqlite(path)
            }
        }
    }

    /// Same origin with the broadcast mechanism unavailable
    pub fn without_broadcast(mut self) -> Self {
        self.hub = None;
        self
    }

    pub fn hub(&self) -> Option<&BroadcastHub> {
        self.hub.as_ref()
    }

    pub fn storage(&self) -> &StorageMedium {
        &self.storage
    }

    /// Start a new execution context on this origin
    pub fn context(&self) -> SyncContext {
        let id = ContextId::generate();
        debug!(context = %id, broadcast = self.hub.is_some(), "Opened sync context");
        SyncContext {
            id,
            hub: self.hub.clone(),
            store: self.storage.view(id),
            registry: Arc::new(Registry::new()),
        }
    }
}

/// One execution context and the public face of the engine
pub struct SyncContext {
    id: ContextId,
    hub: Option<BroadcastHub>,
    store: DurableStore,
    registry: Arc<Registry>,
}

impl SyncContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn env(&self) -> UnitEnv {
        UnitEnv {
            store: self.store.clone(),
            hub: self.hub.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Create a scalar unit. `None` options means all defaults.
    ///
    /// Must be called inside a tokio runtime.
    pub fn create_synced_scalar(
        &self,
        initial: impl Into<SyncValue>,
        options: Option<ScalarOptions>,
    ) -> SyncResult<SyncedScalar> {
        SyncedScalar::create(&self.env(), initial.into(), options)
    }

    /// Create a structured unit. Fails on an empty key.
    ///
    /// Must be called inside a tokio runtime.
    pub fn create_synced_structure(&self, options: StructureOptions) -> SyncResult<SyncedStructure> {
        SyncedStructure::create(&self.env(), options)
    }

    /// Sync trigger of the live unit registered under `key`
    pub fn lookup_sync_trigger(&self, key: &str, flavor: Flavor) -> Option<SyncTrigger> {
        self.registry.sync_trigger(flavor, key)
    }

    /// Tear down the live unit (if any), then delete its stored entry
    pub fn clear_synced_entry(&self, key: &str, flavor: Flavor) {
        if let Some(entry) = self.registry.get(flavor, key) {
            (entry.teardown)();
        }

        let storage_key = flavor.storage_key(key);
        if let Err(e) = self.store.remove(&storage_key) {
            warn!(key = %storage_key, error = %e, "Failed to remove stored entry");
        }
        self.registry.remove(flavor, key);
        info!(key = %storage_key, "Cleared synced entry");
    }

    /// Tear down every live unit, then delete every stored entry of both flavors
    pub fn clear_all_synced_entries(&self) {
        self.teardown_all();

        for flavor in Flavor::all() {
            let prefix = format!("{}-", flavor.prefix());
            let keys = match self.store.keys_with_prefix(&prefix) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(flavor = %flavor, error = %e, "Failed to enumerate stored entries");
                    continue;
                }
            };
            for key in keys {
                if let Err(e) = self.store.remove(&key) {
                    warn!(key = %key, error = %e, "Failed to remove stored entry");
                }
            }
        }

        self.registry.clear();
        info!(context = %self.id, "Cleared all synced entries");
    }

    /// Tear down every live unit without touching stored data
    pub fn reset_registry(&self) {
        self.teardown_all();
        self.registry.clear();
    }

    fn teardown_all(&self) {
        for (flavor, key, entry) in self.registry.entries() {
            if catch_unwind(AssertUnwindSafe(|| (entry.teardown)())).is_err() {
                error!(flavor = %flavor, key = %key, "Unit teardown panicked; continuing");
            }
        }
    }

    /// Keys of persisted scalar units, live or not
    pub fn list_scalar_keys(&self) -> Vec<String> {
        self.list_keys(Flavor::Scalar)
    }

    /// Keys of persisted structured units, live or not
    pub fn list_structure_keys(&self) -> Vec<String> {
        self.list_keys(Flavor::Structure)
    }

    pub fn list_keys(&self, flavor: Flavor) -> Vec<String> {
        let prefix = format!("{}-", flavor.prefix());
        match self.store.keys_with_prefix(&prefix) {
            Ok(keys) => keys
                .iter()
                .filter_map(|key| flavor.strip_prefix(key))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(flavor = %flavor, error = %e, "Failed to enumerate stored entries");
                Vec::new()
            }
        }
    }

    pub fn is_broadcast_transport_supported(&self) -> bool {
        self.hub.is_some()
    }

    /// Real write-then-remove probe; any failure reports `false`
    pub fn is_durable_store_supported(&self) -> bool {
        self.store.probe()
    }

    /// Open a raw broadcast channel, if the origin supports broadcasting
    pub fn open_channel(&self, name: &str) -> Option<ChannelHandle> {
        self.hub.as_ref().map(|hub| hub.open(name))
    }
}
