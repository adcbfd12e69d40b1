//! Shared state machine behind every sync unit
//!
//! `Uninitialized -> Loading -> Live -> TornDown`. Both flavors run the same
//! load, apply and sync logic; they differ only in the editing API built on
//! top and in whether local changes are pushed automatically.
//!
//! Locking: `state` is always taken before the cell's value lock, and no
//! cell subscriber ever runs while `state` is held. Background tasks hold a
//! `Weak` to the core and re-check liveness under `state` before touching
//! anything.

use crate::cell::{Observable, Subscription};
use crate::codec::{decode_envelope, encode_envelope, encode_value, Envelope, SyncValue};
use crate::error::{SyncError, SyncResult};
use crate::metrics as sync_metrics;
use crate::registry::{next_unit_id, Registry, RegistryEntry};
use crate::transport::{BroadcastHub, ChannelHandle, DurableStore, Poller, TransportMode};
use crate::types::{Flavor, Timestamp};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Where a unit is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Loading,
    Live,
    TornDown,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Loading => "loading",
            Lifecycle::Live => "live",
            Lifecycle::TornDown => "torn-down",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of feeding one incoming payload to a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Accepted,
    /// Timestamp not above the watermark
    Stale,
    Malformed,
    /// Unit already torn down
    Inactive,
}

/// What a unit needs from its context
#[derive(Clone)]
pub(crate) struct UnitEnv {
    pub store: DurableStore,
    pub hub: Option<BroadcastHub>,
    pub registry: Arc<Registry>,
}

/// Transport-related construction settings common to both flavors
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnitSettings {
    pub persist_on_load: bool,
    pub polling_interval: Option<Duration>,
    pub transport_mode: TransportMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Channel,
    StorageEvent,
    Poll,
    /// Handed in by the caller
    External,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Channel => "channel",
            Source::StorageEvent => "storage-event",
            Source::Poll => "poll",
            Source::External => "external",
        };
        write!(f, "{}", name)
    }
}

/// How far a sync stamp may run ahead of the wall clock
const MAX_STAMP_LEAD_MS: i64 = 1;

/// Stamp for a local sync: the wall clock, nudged past a watermark equal to
/// it so a write made right after accepting a remote one outranks it. Never
/// more than [`MAX_STAMP_LEAD_MS`] ahead of `now`; a watermark further ahead
/// (a peer with a fast clock) is not chased.
fn sync_stamp(watermark: Timestamp, now: Timestamp) -> Timestamp {
    let now = now.as_millis();
    let ceiling = now.saturating_add(MAX_STAMP_LEAD_MS);
    Timestamp::from_millis(watermark.as_millis().saturating_add(1).clamp(now, ceiling))
}

struct CoreState {
    lifecycle: Lifecycle,
    watermark: Timestamp,
    /// Encoded form of the value last synced, applied or observed
    last_serialized: String,
    channel: Option<ChannelHandle>,
    listeners: Vec<JoinHandle<()>>,
    poller: Option<Poller>,
    throttle: Option<JoinHandle<()>>,
    auto_sync: Option<Subscription>,
}

pub(crate) struct UnitCore {
    id: u64,
    key: String,
    flavor: Flavor,
    storage_key: String,
    cell: Observable<SyncValue>,
    store: DurableStore,
    hub: Option<BroadcastHub>,
    settings: UnitSettings,
    registry: Weak<Registry>,
    runtime: Handle,
    state: Mutex<CoreState>,
}

impl UnitCore {
    /// Build, register, load and activate a unit
    pub(crate) fn start(
        env: &UnitEnv,
        flavor: Flavor,
        key: String,
        initial: SyncValue,
        settings: UnitSettings,
    ) -> SyncResult<Arc<UnitCore>> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Runtime(e.to_string()))?;
        let storage_key = flavor.storage_key(&key);

        let core = Arc::new(UnitCore {
            id: next_unit_id(),
            key,
            flavor,
            storage_key,
            cell: Observable::new(initial),
            store: env.store.clone(),
            hub: env.hub.clone(),
            settings,
            registry: Arc::downgrade(&env.registry),
            runtime,
            state: Mutex::new(CoreState {
                lifecycle: Lifecycle::Uninitialized,
                watermark: Timestamp::now(),
                last_serialized: String::new(),
                channel: None,
                listeners: Vec::new(),
                poller: None,
                throttle: None,
                auto_sync: None,
            }),
        });
        sync_metrics::unit_started();

        env.registry.register(flavor, &core.key, core.registry_entry())?;
        core.load();
        core.go_live();

        info!(
            key = %core.key,
            flavor = %core.flavor,
            context = %core.store.context(),
            transport = core.transport_name(),
            "Sync unit live"
        );
        Ok(core)
    }

    fn state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_entry(self: &Arc<Self>) -> RegistryEntry {
        let for_sync = Arc::downgrade(self);
        let for_teardown = Arc::downgrade(self);
        RegistryEntry::for_unit(
            self.id,
            Arc::new(move || {
                if let Some(core) = for_sync.upgrade() {
                    core.sync_now();
                }
            }),
            Arc::new(move || {
                if let Some(core) = for_teardown.upgrade() {
                    core.teardown();
                }
            }),
        )
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub(crate) fn cell(&self) -> &Observable<SyncValue> {
        &self.cell
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    pub(crate) fn watermark(&self) -> Timestamp {
        self.state().watermark
    }

    fn uses_channel(&self) -> bool {
        self.settings.transport_mode == TransportMode::BroadcastPreferred && self.hub.is_some()
    }

    fn transport_name(&self) -> &'static str {
        if self.uses_channel() {
            "broadcast"
        } else if self.settings.polling_interval.is_some() {
            "durable+poll"
        } else {
            "durable"
        }
    }

    fn load(&self) {
        self.state().lifecycle = Lifecycle::Loading;

        let stored = match self.store.read(&self.storage_key) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "Durable store unreadable during load");
                None
            }
        };

        let envelope = stored.and_then(|raw| match decode_envelope(&raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "Ignoring malformed stored entry");
                sync_metrics::envelope_malformed();
                None
            }
        });

        match envelope {
            Some(envelope) => {
                debug!(key = %self.storage_key, timestamp = %envelope.timestamp, "Loaded stored value");
                let mut state = self.state();
                state.watermark = envelope.timestamp;
                state.last_serialized = encode_value(&envelope.data);
                self.cell.replace_quiet(envelope.data);
                drop(state);
                self.cell.notify();
            }
            None if self.settings.persist_on_load => {
                debug!(key = %self.storage_key, "Nothing stored; persisting initial value");
                self.sync_now();
            }
            None => {
                self.state().last_serialized = self.cell.with(encode_value);
            }
        }
    }

    fn go_live(self: &Arc<Self>) {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::TornDown {
            return;
        }
        state.lifecycle = Lifecycle::Live;

        if let Some(hub) = self.hub.as_ref().filter(|_| self.uses_channel()) {
            let channel = hub.open(&self.storage_key);
            if let Some(mut messages) = channel.messages() {
                let weak = Arc::downgrade(self);
                state.listeners.push(self.runtime.spawn(async move {
                    while let Some(raw) = messages.recv().await {
                        match weak.upgrade() {
                            Some(core) => {
                                core.apply_incoming(&raw, Source::Channel);
                            }
                            None => break,
                        }
                    }
                }));
            }
            state.channel = Some(channel);
            return;
        }

        let mut events = self.store.subscribe();
        let weak = Arc::downgrade(self);
        let key = self.storage_key.clone();
        state.listeners.push(self.runtime.spawn(async move {
            while let Some(change) = events.recv().await {
                if change.key != key {
                    continue;
                }
                let Some(core) = weak.upgrade() else { break };
                match change.new_value {
                    Some(raw) => {
                        core.apply_incoming(&raw, Source::StorageEvent);
                    }
                    None => trace!(key = %key, "Entry removed by another context"),
                }
            }
        }));

        if let Some(interval) = self.settings.polling_interval {
            let weak = Arc::downgrade(self);
            state.poller = Some(Poller::start(
                &self.runtime,
                self.store.clone(),
                self.storage_key.clone(),
                interval,
                move |raw| {
                    if let Some(core) = weak.upgrade() {
                        core.apply_incoming(&raw, Source::Poll);
                    }
                },
            ));
        }
    }

    /// Decode `raw` and apply it if it is newer than the watermark
    pub(crate) fn apply_incoming(&self, raw: &str, source: Source) -> ApplyOutcome {
        let envelope = match decode_envelope(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %self.storage_key, %source, error = %e, "Discarding malformed envelope");
                sync_metrics::envelope_malformed();
                return ApplyOutcome::Malformed;
            }
        };
        self.apply_envelope(envelope, source)
    }

    fn apply_envelope(&self, envelope: Envelope, source: Source) -> ApplyOutcome {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::TornDown {
            return ApplyOutcome::Inactive;
        }
        if envelope.timestamp <= state.watermark {
            trace!(
                key = %self.storage_key,
                %source,
                incoming = %envelope.timestamp,
                watermark = %state.watermark,
                "Discarding stale envelope"
            );
            sync_metrics::envelope_discarded();
            return ApplyOutcome::Stale;
        }

        state.watermark = envelope.timestamp;
        state.last_serialized = encode_value(&envelope.data);
        self.cell.replace_quiet(envelope.data);
        drop(state);

        debug!(key = %self.storage_key, %source, timestamp = %envelope.timestamp, "Applied remote value");
        sync_metrics::envelope_applied();
        self.cell.notify();
        ApplyOutcome::Accepted
    }

    /// Stamp the current value and push it out on every transport
    pub(crate) fn sync_now(&self) -> bool {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::TornDown {
            debug!(key = %self.storage_key, "Ignoring sync on torn-down unit");
            return false;
        }

        let envelope = Envelope::new(self.cell.get(), sync_stamp(state.watermark, Timestamp::now()));
        let payload = encode_envelope(&envelope);

        if let Err(e) = self.store.write(&self.storage_key, &payload) {
            warn!(key = %self.storage_key, error = %e, "Durable write failed; value stays local");
        }

        if let Some(channel) = state.channel.as_ref() {
            if let Err(e) = channel.send(&payload) {
                warn!(key = %self.storage_key, error = %e, "Skipping broadcast on closed channel");
                sync_metrics::broadcast_dropped();
                state.channel = None;
            }
        }

        state.watermark = state.watermark.max(envelope.timestamp);
        state.last_serialized = encode_value(&envelope.data);
        trace!(key = %self.storage_key, timestamp = %envelope.timestamp, "Synced");
        sync_metrics::envelope_sent();
        true
    }

    /// Push local changes automatically, at most once per `throttle`
    pub(crate) fn enable_auto_sync(self: &Arc<Self>, throttle: Duration) {
        let weak = Arc::downgrade(self);
        let subscription = self.cell.subscribe(move |value| {
            if let Some(core) = weak.upgrade() {
                core.on_local_change(value, throttle);
            }
        });

        let mut state = self.state();
        if state.lifecycle == Lifecycle::TornDown {
            return;
        }
        state.auto_sync = Some(subscription);
    }

    fn on_local_change(self: &Arc<Self>, value: &SyncValue, throttle: Duration) {
        let serialized = encode_value(value);
        let mut state = self.state();
        if state.lifecycle != Lifecycle::Live || serialized == state.last_serialized {
            return;
        }
        state.last_serialized = serialized;
        if state.throttle.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let deadline = tokio::time::Instant::now() + throttle;
        state.throttle = Some(self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(core) = weak.upgrade() {
                core.state().throttle = None;
                core.sync_now();
            }
        }));
    }

    /// Stop every listener and timer and leave the registry. Idempotent.
    pub(crate) fn teardown(&self) -> bool {
        let mut state = self.state();
        if state.lifecycle == Lifecycle::TornDown {
            return false;
        }
        let was = state.lifecycle;
        state.lifecycle = Lifecycle::TornDown;

        if let Some(timer) = state.throttle.take() {
            timer.abort();
        }
        if let Some(channel) = state.channel.take() {
            channel.close();
        }
        for listener in state.listeners.drain(..) {
            listener.abort();
        }
        if let Some(poller) = state.poller.take() {
            poller.stop();
        }
        let auto_sync = state.auto_sync.take();
        drop(state);
        drop(auto_sync);

        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.flavor, &self.key, self.id);
        }
        sync_metrics::unit_stopped();
        info!(key = %self.key, flavor = %self.flavor, from = %was, "Sync unit torn down");
        true
    }
}

impl Drop for UnitCore {
    fn drop(&mut self) {
        self.teardown();
    }
}
