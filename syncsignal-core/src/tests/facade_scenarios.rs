/*
    Facade scenarios

    Tests:
    1. Scalar and structured units with the same key never interfere
    2. Sync triggers are reachable by key and flavor
    3. Clearing an entry tears the unit down before the store is wiped
    4. Clearing everything survives a panicking teardown
    5. Key enumeration reflects the store, not the registry
    6. Capability probes and degraded storage
    7. Duplicate live keys are rejected
*/

use crate::error::SyncError;
use crate::registry::RegistryEntry;
use crate::test_utils::{eventually, two_contexts, CountingBackend, TestOriginBuilder};
use crate::transport::MemoryBackend;
use crate::types::Flavor;
use crate::unit::{Lifecycle, ScalarOptions, StructureOptions};
use crate::SyncValue;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_namespace_isolation() {
    let origin = TestOriginBuilder::new().build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let scalar_a = tab_a.create_synced_scalar(1, Some(ScalarOptions::new("shared"))).unwrap();
    let doc_a = tab_a
        .create_synced_structure(StructureOptions::new("shared", json!({"n": 1})))
        .unwrap();
    let scalar_b = tab_b.create_synced_scalar(0, Some(ScalarOptions::new("shared"))).unwrap();
    let doc_b = tab_b
        .create_synced_structure(StructureOptions::new("shared", json!({"n": 0})))
        .unwrap();

    assert_eq!(scalar_b.get(), SyncValue::from(1));
    assert_eq!(doc_b.state().to_json(), json!({"n": 1}));

    scalar_a.set(2);
    scalar_a.sync();
    eventually("scalar propagates", || scalar_b.get() == SyncValue::from(2)).await;
    assert_eq!(doc_b.state().to_json(), json!({"n": 1}));

    doc_a.patch(["n"], 5).unwrap();
    doc_a.sync();
    eventually("structure propagates", || doc_b.state().to_json() == json!({"n": 5})).await;
    assert_eq!(scalar_b.get(), SyncValue::from(2));

    assert_eq!(tab_a.list_scalar_keys(), vec!["shared"]);
    assert_eq!(tab_a.list_structure_keys(), vec!["shared"]);
}

#[tokio::test]
async fn test_lookup_sync_trigger() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let ctx = origin.context();

    let doc = ctx.create_synced_structure(StructureOptions::new("prefs", json!({}))).unwrap();
    assert!(ctx.lookup_sync_trigger("prefs", Flavor::Scalar).is_none());
    assert!(ctx.lookup_sync_trigger("missing", Flavor::Structure).is_none());

    doc.patch(["font"], "mono").unwrap();
    let trigger = ctx.lookup_sync_trigger("prefs", Flavor::Structure).unwrap();
    trigger();
    assert_eq!(backend.writes("syncstore-prefs"), 2);
    assert!(ctx.store().read("syncstore-prefs").unwrap().unwrap().contains("mono"));

    // Trigger of a dropped unit is inert
    drop(doc);
    trigger();
    assert_eq!(backend.writes("syncstore-prefs"), 2);
}

#[tokio::test]
async fn test_clear_entry_tears_down_first() {
    let origin = TestOriginBuilder::new().build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let a = tab_a.create_synced_scalar(1, Some(ScalarOptions::new("session"))).unwrap();
    let b = tab_b.create_synced_scalar(1, Some(ScalarOptions::new("session"))).unwrap();

    tab_b.clear_synced_entry("session", Flavor::Scalar);
    assert_eq!(b.lifecycle(), Lifecycle::TornDown);
    assert!(tab_b.lookup_sync_trigger("session", Flavor::Scalar).is_none());
    assert!(tab_b.list_scalar_keys().is_empty());

    // A late sync from the cleared unit cannot resurrect the entry
    b.set(99);
    b.sync();
    assert!(tab_b.store().read("syncsignal-session").unwrap().is_none());

    // Other contexts are unaffected
    assert_eq!(a.lifecycle(), Lifecycle::Live);
    a.set(2);
    a.sync();
    assert!(tab_a.store().read("syncsignal-session").unwrap().is_some());
}

#[tokio::test]
async fn test_clear_entry_defaults_to_structure_namespace() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();
    let _scalar = ctx.create_synced_scalar(1, Some(ScalarOptions::new("both"))).unwrap();
    let doc = ctx.create_synced_structure(StructureOptions::new("both", json!({}))).unwrap();

    ctx.clear_synced_entry("both", Flavor::default());
    assert_eq!(doc.lifecycle(), Lifecycle::TornDown);
    assert_eq!(ctx.list_scalar_keys(), vec!["both"]);
    assert!(ctx.list_structure_keys().is_empty());
}

#[tokio::test]
async fn test_clear_all_survives_panicking_teardown() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();

    let a = ctx.create_synced_scalar(1, Some(ScalarOptions::new("a"))).unwrap();
    let doc = ctx.create_synced_structure(StructureOptions::new("b", json!({}))).unwrap();
    ctx.registry()
        .register(
            Flavor::Scalar,
            "bad",
            RegistryEntry::new(Arc::new(|| {}), Arc::new(|| panic!("teardown exploded"))),
        )
        .unwrap();
    ctx.store().write("unrelated", "keep me").unwrap();

    ctx.clear_all_synced_entries();

    assert_eq!(a.lifecycle(), Lifecycle::TornDown);
    assert_eq!(doc.lifecycle(), Lifecycle::TornDown);
    assert!(ctx.registry().is_empty());
    assert!(ctx.list_scalar_keys().is_empty());
    assert!(ctx.list_structure_keys().is_empty());
    assert_eq!(ctx.store().read("unrelated").unwrap().as_deref(), Some("keep me"));
}

#[tokio::test]
async fn test_keys_reflect_store_not_registry() {
    let origin = TestOriginBuilder::new().build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let unit = tab_a.create_synced_scalar(1, Some(ScalarOptions::new("theme"))).unwrap();
    let _doc = tab_a.create_synced_structure(StructureOptions::new("cart", json!([]))).unwrap();
    unit.teardown();

    assert_eq!(tab_b.list_scalar_keys(), vec!["theme"]);
    assert_eq!(tab_b.list_structure_keys(), vec!["cart"]);
    assert!(tab_b.registry().is_empty());
}

#[tokio::test]
async fn test_reset_registry_keeps_data() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();
    let unit = ctx.create_synced_scalar(1, Some(ScalarOptions::new("kept"))).unwrap();

    ctx.reset_registry();
    assert_eq!(unit.lifecycle(), Lifecycle::TornDown);
    assert!(ctx.registry().is_empty());
    assert_eq!(ctx.list_scalar_keys(), vec!["kept"]);
}

#[tokio::test]
async fn test_capability_probes() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();
    assert!(ctx.is_broadcast_transport_supported());
    assert!(ctx.is_durable_store_supported());
    assert!(ctx.store().keys_with_prefix("").unwrap().is_empty());

    let without = TestOriginBuilder::new().without_broadcast().build().context();
    assert!(!without.is_broadcast_transport_supported());
    assert!(without.open_channel("syncsignal-x").is_none());

    let full = TestOriginBuilder::new()
        .with_backend(Arc::new(MemoryBackend::with_quota(4)))
        .build()
        .context();
    assert!(!full.is_durable_store_supported());
}

#[tokio::test]
async fn test_storage_outage_degrades_to_local() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_available(false);
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let (tab_a, tab_b) = two_contexts(&origin);
    assert!(!tab_a.is_durable_store_supported());

    let a = tab_a.create_synced_scalar(1, Some(ScalarOptions::new("offline"))).unwrap();
    let b = tab_b.create_synced_scalar(1, Some(ScalarOptions::new("offline"))).unwrap();
    assert!(tab_a.list_scalar_keys().is_empty());

    // Neither loaded anything; let the wall clock pass b's own stamp
    sleep(Duration::from_millis(5)).await;

    // Broadcast still works without the store
    a.set(2);
    a.sync();
    eventually("broadcast without store", || b.get() == SyncValue::from(2)).await;
}

#[tokio::test]
async fn test_storage_outage_without_broadcast_stays_local() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_available(false);
    let origin = TestOriginBuilder::new().without_broadcast().with_backend(backend).build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let a = tab_a.create_synced_scalar(1, Some(ScalarOptions::new("island"))).unwrap();
    let b = tab_b.create_synced_scalar(1, Some(ScalarOptions::new("island"))).unwrap();

    a.set(2);
    a.sync();
    assert_eq!(a.get(), SyncValue::from(2));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(b.get(), SyncValue::from(1));
}

#[tokio::test]
async fn test_duplicate_live_key_rejected() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();

    let first = ctx.create_synced_scalar(1, Some(ScalarOptions::new("dup"))).unwrap();
    let err = ctx.create_synced_scalar(2, Some(ScalarOptions::new("dup"))).unwrap_err();
    assert!(matches!(err, SyncError::KeyInUse(_)));
    assert_eq!(first.lifecycle(), Lifecycle::Live);

    // Same key in the other namespace is fine
    assert!(ctx.create_synced_structure(StructureOptions::new("dup", json!({}))).is_ok());

    // And in another context
    let other = origin.context();
    assert!(other.create_synced_scalar(3, Some(ScalarOptions::new("dup"))).is_ok());
}
