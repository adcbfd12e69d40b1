//! Observable cell
//!
//! The minimal reactive contract the engine needs: read, write, and be told
//! about changes. UI bindings sit on top of this; the engine does not care
//! which.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: RwLock<T>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

/// Shared, observable value
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub fn new(initial: T) -> Self {
        Observable {
            inner: Arc::new(Inner {
                value: RwLock::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the current value
    pub fn get(&self) -> T {
        self.inner.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Borrow the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the value and notify subscribers
    pub fn set(&self, next: T) {
        self.replace_quiet(next);
        self.notify();
    }

    /// Derive the next value from the current one and notify subscribers
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        {
            let mut value = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            let next = f(&value);
            *value = next;
        }
        self.notify();
    }

    /// Like [`Observable::update`], but the step may fail; on error the
    /// value is unchanged and nobody is notified
    pub fn try_update<E>(&self, f: impl FnOnce(&T) -> Result<T, E>) -> Result<(), E> {
        {
            let mut value = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            let next = f(&value)?;
            *value = next;
        }
        self.notify();
        Ok(())
    }

    /// Register `callback`; it runs after every change until the
    /// returned [`Subscription`] is dropped
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .subscribers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retain(|(sub_id, _)| *sub_id != id);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Store without notifying. Pair with [`Observable::notify`].
    pub(crate) fn replace_quiet(&self, next: T) {
        *self.inner.value.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Run every subscriber against the current value.
    /// No lock is held while callbacks execute.
    pub(crate) fn notify(&self) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        if callbacks.is_empty() {
            return;
        }

        let snapshot = self.get();
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

/// Keeps a subscriber attached; detaches on drop
#[must_use = "dropping a Subscription detaches the callback"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
