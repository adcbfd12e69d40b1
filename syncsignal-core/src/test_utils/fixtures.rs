//! Test fixtures
//!
//! Origins, paired contexts and canned payloads used across the test suites.

use crate::codec::{encode_envelope, Envelope, SyncValue};
use crate::context::{Origin, SyncContext};
use crate::error::StorageError;
use crate::transport::{MemoryBackend, StorageBackend};
use crate::types::Timestamp;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Builder for test origins
pub struct TestOriginBuilder {
    broadcast: bool,
    backend: Option<Arc<dyn StorageBackend>>,
}

impl TestOriginBuilder {
    pub fn new() -> Self {
        Self {
            broadcast: true,
            backend: None,
        }
    }

    /// Contexts on this origin fall back to durable-store events
    pub fn without_broadcast(mut self) -> Self {
        self.broadcast = false;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Origin {
        let backend = self.backend.unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let origin = Origin::new(backend);
        if self.broadcast {
            origin
        } else {
            origin.without_broadcast()
        }
    }
}

impl Default for TestOriginBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory backend that counts successful writes per key
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    writes: Mutex<HashMap<String, usize>>,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self, key: &str) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }
}

impl StorageBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(key, value)?;
        *self
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default() += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys()
    }
}

/// Two independent contexts ("tabs") on the same origin
pub fn two_contexts(origin: &Origin) -> (SyncContext, SyncContext) {
    (origin.context(), origin.context())
}

/// Encoded envelope carrying `value` at a fixed timestamp
pub fn stamped_envelope(value: impl Into<SyncValue>, millis: i64) -> String {
    encode_envelope(&Envelope::new(value.into(), Timestamp::from_millis(millis)))
}

/// A small todo-list document for structured-unit tests
pub fn todo_document() -> SyncValue {
    SyncValue::from(json!({
        "filter": "all",
        "todos": [
            {"title": "write tests", "done": false}
        ]
    }))
}

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
