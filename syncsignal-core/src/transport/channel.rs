//! Ephemeral broadcast channel
//!
//! A [`BroadcastHub`] is the in-origin message bus: every [`ChannelHandle`]
//! opened under the same name receives the text posted by every *other*
//! handle of that name. Nothing is persisted; a context that is not listening
//! at post time never sees the message.

use crate::error::TransportError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    channels: HashMap<String, Vec<Subscriber>>,
}

/// Shared broadcast medium of one origin
#[derive(Clone, Default)]
pub struct BroadcastHub {
    state: Arc<Mutex<HubState>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a handle on the channel `name`
    pub fn open(&self, name: &str) -> ChannelHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state
            .channels
            .entry(name.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        drop(state);

        debug!(channel = name, handle = id, "Opened broadcast channel");

        ChannelHandle {
            name: name.to_string(),
            id,
            hub: self.clone(),
            closed: AtomicBool::new(false),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Number of open handles on `name`
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.lock().channels.get(name).map(Vec::len).unwrap_or(0)
    }

    fn post(&self, name: &str, from: u64, payload: &str) -> usize {
        let state = self.lock();
        let Some(subscribers) = state.channels.get(name) else {
            return 0;
        };

        subscribers
            .iter()
            .filter(|sub| sub.id != from)
            .filter(|sub| sub.tx.send(payload.to_string()).is_ok())
            .count()
    }

    fn detach(&self, name: &str, id: u64) {
        let mut state = self.lock();
        if let Some(subscribers) = state.channels.get_mut(name) {
            subscribers.retain(|sub| sub.id != id);
            if subscribers.is_empty() {
                state.channels.remove(name);
            }
        }
    }
}

/// One open endpoint of a named channel
pub struct ChannelHandle {
    name: String,
    id: u64,
    hub: BroadcastHub,
    closed: AtomicBool,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl ChannelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Post `payload` to every other handle on this channel
    ///
    /// Returns the number of handles that received it.
    pub fn send(&self, payload: &str) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed(self.name.clone()));
        }
        let delivered = self.hub.post(&self.name, self.id, payload);
        trace!(channel = %self.name, delivered, "Posted broadcast message");
        Ok(delivered)
    }

    /// Take the incoming message stream. Only the first call gets it.
    pub fn messages(&self) -> Option<ChannelMessages> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| ChannelMessages { rx })
    }

    /// Detach from the hub. Safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.hub.detach(&self.name, self.id);
            debug!(channel = %self.name, handle = self.id, "Closed broadcast channel");
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Incoming side of a [`ChannelHandle`]
pub struct ChannelMessages {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelMessages {
    /// Next message, or `None` once the handle is closed
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
