/*
    durable.rs - Per-context view of the durable store

    Wraps the origin's backend for one execution context:
    - read / write / remove / enumerate by prefix
    - change notifications for writes made by *other* contexts
    - write-then-remove capability probe

    Change events are fanned out to one unbounded queue per subscriber, so a
    slow listener never loses a change. Each event carries its writer; a
    context never receives its own writes back.
*/

use super::backend::StorageBackend;
use crate::error::StorageError;
use crate::metrics as sync_metrics;
use crate::types::ContextId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Key used by the capability probe
pub const PROBE_KEY: &str = "__syncsignal_probe__";

struct EventSubscriber {
    context: ContextId,
    tx: mpsc::UnboundedSender<StorageChange>,
}

/// A change made by another context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    /// `None` when the entry was removed
    pub new_value: Option<String>,
}

/// Backend plus its change-event bus, shared by all contexts of an origin
#[derive(Clone)]
pub struct StorageMedium {
    backend: Arc<dyn StorageBackend>,
    subscribers: Arc<Mutex<Vec<EventSubscriber>>>,
}

impl StorageMedium {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        StorageMedium {
            backend,
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<EventSubscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a change to every subscriber except the writer's own.
    /// Subscribers whose stream was dropped are pruned.
    fn publish(&self, writer: ContextId, key: &str, new_value: Option<String>) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|sub| {
            if sub.context == writer {
                return !sub.tx.is_closed();
            }
            sub.tx
                .send(StorageChange {
                    key: key.to_string(),
                    new_value: new_value.clone(),
                })
                .is_ok()
        });
        trace!(key, listeners = subscribers.len(), "Published storage change");
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// View of this medium for one context
    pub fn view(&self, context: ContextId) -> DurableStore {
        DurableStore {
            medium: self.clone(),
            context,
        }
    }
}

/// Durable store as seen by one execution context
#[derive(Clone)]
pub struct DurableStore {
    medium: StorageMedium,
    context: ContextId,
}

impl DurableStore {
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn backend_name(&self) -> &'static str {
        self.medium.backend.name()
    }

    pub fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.medium.backend.get(key).inspect_err(|_| sync_metrics::storage_error())
    }

    /// Persist `payload` under `key` and notify other contexts
    pub fn write(&self, key: &str, payload: &str) -> Result<(), StorageError> {
        self.medium
            .backend
            .set(key, payload)
            .inspect_err(|_| sync_metrics::storage_error())?;
        self.notify(key, Some(payload.to_string()));
        Ok(())
    }

    /// Delete `key` and notify other contexts
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.medium
            .backend
            .remove(key)
            .inspect_err(|_| sync_metrics::storage_error())?;
        self.notify(key, None);
        Ok(())
    }

    /// Keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .medium
            .backend
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Subscribe to writes made by other contexts
    pub fn subscribe(&self) -> StorageEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.medium.subscribers().push(EventSubscriber {
            context: self.context,
            tx,
        });
        StorageEvents { rx }
    }

    /// Whether a real write followed by a remove succeeds
    pub fn probe(&self) -> bool {
        let backend = &self.medium.backend;
        match backend.set(PROBE_KEY, PROBE_KEY).and_then(|_| backend.remove(PROBE_KEY)) {
            Ok(()) => true,
            Err(e) => {
                debug!(backend = backend.name(), error = %e, "Durable store probe failed");
                false
            }
        }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        self.medium.publish(self.context, key, new_value);
    }
}

/// Stream of changes made by other contexts
pub struct StorageEvents {
    rx: mpsc::UnboundedReceiver<StorageChange>,
}

impl StorageEvents {
    /// Next foreign change, or `None` once the origin is gone
    pub async fn recv(&mut self) -> Option<StorageChange> {
        self.rx.recv().await
    }
}
