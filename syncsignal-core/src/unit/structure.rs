//! Structured sync unit: a nested document edited by path
//!
//! Edits never sync by themselves; call [`SyncedStructure::sync`] once a
//! batch of patches is complete.

use super::machine::{ApplyOutcome, Lifecycle, Source, UnitCore, UnitEnv, UnitSettings};
use super::options::StructureOptions;
use crate::cell::{shallow_merge, update_at_path, value_at_path, Observable, PathSegment, Subscription};
use crate::codec::SyncValue;
use crate::error::{SyncError, SyncResult};
use crate::types::{Flavor, Timestamp};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Handle to a structured unit. Clones share the same unit.
#[derive(Clone)]
pub struct SyncedStructure {
    core: Arc<UnitCore>,
}

fn collect_path<P>(path: P) -> Vec<PathSegment>
where
    P: IntoIterator,
    P::Item: Into<PathSegment>,
{
    path.into_iter().map(Into::into).collect()
}

impl SyncedStructure {
    pub(crate) fn create(env: &UnitEnv, options: StructureOptions) -> SyncResult<Self> {
        options.validate()?;
        let settings = UnitSettings {
            persist_on_load: options.persist_on_load,
            polling_interval: options.polling_interval,
            transport_mode: options.transport_mode,
        };

        let core = UnitCore::start(env, Flavor::Structure, options.key, options.initial_value, settings)?;
        Ok(SyncedStructure { core })
    }

    pub fn key(&self) -> &str {
        self.core.key()
    }

    pub fn storage_key(&self) -> &str {
        self.core.storage_key()
    }

    /// Snapshot of the whole document
    pub fn state(&self) -> SyncValue {
        self.core.cell().get()
    }

    /// Whole document decoded into `T`
    pub fn state_as<T: DeserializeOwned>(&self) -> SyncResult<T> {
        Ok(self.core.cell().with(|value| value.deserialize_into())?)
    }

    /// Value at `path`, if it exists
    pub fn get<P>(&self, path: P) -> Option<SyncValue>
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
    {
        let path = collect_path(path);
        self.core.cell().with(|root| value_at_path(root, &path).cloned())
    }

    /// Shallow-merge `value` into the member at `path`
    ///
    /// Objects combine member-wise; anything else replaces the member.
    /// Missing parents are created.
    pub fn patch<P>(&self, path: P, value: impl Into<SyncValue>) -> SyncResult<()>
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
    {
        let path = collect_path(path);
        let value = value.into();
        self.edit(&path, move |current| shallow_merge(current, value))
    }

    /// Replace the member at `path` with `updater(current)`
    pub fn patch_with<P>(&self, path: P, updater: impl FnOnce(&SyncValue) -> SyncValue) -> SyncResult<()>
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
    {
        let path = collect_path(path);
        self.edit(&path, updater)
    }

    /// Overwrite the member at `path` without merging
    pub fn replace<P>(&self, path: P, value: impl Into<SyncValue>) -> SyncResult<()>
    where
        P: IntoIterator,
        P::Item: Into<PathSegment>,
    {
        let path = collect_path(path);
        let value = value.into();
        self.edit(&path, move |_| value)
    }

    /// Shallow-merge `value` into the document root
    pub fn merge(&self, value: impl Into<SyncValue>) {
        let value = value.into();
        self.core.cell().update(move |current| shallow_merge(current, value));
    }

    fn edit(&self, path: &[PathSegment], f: impl FnOnce(&SyncValue) -> SyncValue) -> SyncResult<()> {
        self.core.cell().try_update(|current| {
            let mut next = current.clone();
            update_at_path(&mut next, path, f)?;
            Ok::<_, SyncError>(next)
        })
    }

    pub fn sync(&self) {
        self.core.sync_now();
    }

    pub fn subscribe(&self, callback: impl Fn(&SyncValue) + Send + Sync + 'static) -> Subscription {
        self.core.cell().subscribe(callback)
    }

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

    pub fn teardown(&self) {
        self.core.teardown();
    }
}

impl fmt::Debug for SyncedStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedStructure")
            .field("key", &self.key())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
