//! Last-resort polling of one durable-store key
//!
//! Only used when a unit is explicitly configured with a polling interval.
//! Compares raw stored text between ticks and reports literal differences,
//! so nothing is decoded unless the entry actually changed.

use super::durable::DurableStore;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// A running poll loop. Stops on [`Poller::stop`] or drop.
pub struct Poller {
    key: String,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start polling `key` every `interval`
    ///
    /// The first snapshot is taken immediately and is not reported.
    pub fn start<F>(
        runtime: &Handle,
        store: DurableStore,
        key: impl Into<String>,
        interval: Duration,
        on_change: F,
    ) -> Self
    where
        F: Fn(String) + Send + 'static,
    {
        let key = key.into();
        let task_key = key.clone();

        let handle = runtime.spawn(async move {
            let mut last = store.read(&task_key).ok().flatten();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match store.read(&task_key) {
                    Ok(current) if current != last => {
                        last = current.clone();
                        if let Some(raw) = current {
                            trace!(key = %task_key, "Poll detected a change");
                            on_change(raw);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!(key = %task_key, error = %e, "Poll read failed"),
                }
            }
        });

        debug!(key = %key, interval_ms = interval.as_millis() as u64, "Started polling");
        Poller { key, handle }
    }

    pub fn stop(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            debug!(key = %self.key, "Stopped polling");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
