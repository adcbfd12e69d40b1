/*
    backend.rs - Durable key-value storage backends

    A backend is the raw string-to-string store shared by every context of an
    origin. It knows nothing about contexts or change notifications; those
    live in `DurableStore`.

    Implementations:
    - MemoryBackend: in-process map with optional quota / outage simulation
    - SqliteBackend: see sqlite.rs
*/

use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Helper to convert poison errors into StorageError
pub(crate) fn handle_poison<T>(_err: PoisonError<T>) -> StorageError {
    StorageError::Backend("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Raw durable key-value store
pub trait StorageBackend: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every stored key, in no particular order
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
    /// Maximum total bytes (keys + values)
    quota: Option<usize>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes pushing it past `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        MemoryBackend {
            quota: Some(bytes),
            ..Default::default()
        }
    }

    /// Simulate the store disappearing (or coming back)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::Acquire) {
            Err(StorageError::Unavailable("memory backend disabled".to_string()))
        } else {
            Ok(())
        }
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.read().map_err(handle_poison)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(handle_poison)?;

        if let Some(limit) = self.quota {
            let replaced = entries.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let needed = Self::used_bytes(&entries) - replaced + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.entries.write().map_err(handle_poison)?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.read().map_err(handle_poison)?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_crud() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("a").unwrap(), None);

        backend.set("a", "1").unwrap();
        backend.set("a", "2").unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(backend.keys().unwrap(), vec!["a".to_string()]);

        backend.remove("a").unwrap();
        backend.remove("a").unwrap();
        assert_eq!(backend.get("a").unwrap(), None);
    }

    #[test]
    fn test_quota_exceeded() {
        let backend = MemoryBackend::with_quota(8);
        backend.set("k", "1234567").unwrap();

        let err = backend.set("j", "x").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 10, limit: 8 }));

        // Overwriting an existing key only counts the difference
        backend.set("k", "7654321").unwrap();
    }

    #[test]
    fn test_zero_quota_rejects_every_write() {
        let backend = MemoryBackend::with_quota(0);
        assert!(backend.set("k", "").is_err());
    }

    #[test]
    fn test_unavailable_backend() {
        let backend = MemoryBackend::new();
        backend.set("a", "1").unwrap();
        backend.set_available(false);

        assert!(matches!(backend.get("a"), Err(StorageError::Unavailable(_))));
        assert!(matches!(backend.keys(), Err(StorageError::Unavailable(_))));

        backend.set_available(true);
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
    }
}
