/*
    Scalar unit scenarios

    Tests:
    1. Bootstrap persists exactly once when nothing is stored
    2. Stored value wins over the initial value on load
    3. Manual sync reaches another context over the broadcast channel
    4. Throttled auto-sync coalesces a burst into one trailing sync
    5. Remote applies do not echo back out through auto-sync
    6. Missing options fall back to defaults
    7. Teardown is idempotent and stops all traffic
*/

use crate::codec::decode_envelope;
use crate::test_utils::{eventually, stamped_envelope, two_contexts, CountingBackend, TestOriginBuilder};
use crate::types::{Flavor, Timestamp};
use crate::unit::{Lifecycle, ScalarOptions, DEFAULT_SCALAR_KEY};
use crate::SyncValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_bootstrap_persists_once() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let ctx = origin.context();

    let before = Timestamp::now().as_millis();
    let unit = ctx.create_synced_scalar("light", Some(ScalarOptions::new("theme"))).unwrap();
    let after = Timestamp::now().as_millis();

    assert_eq!(backend.writes("syncsignal-theme"), 1);
    let stored = ctx.store().read("syncsignal-theme").unwrap().unwrap();
    let envelope = decode_envelope(&stored).unwrap();
    assert_eq!(envelope.data, SyncValue::from("light"));
    assert!(envelope.timestamp.as_millis() >= before);
    assert!(envelope.timestamp.as_millis() <= after + 1);
    assert_eq!(unit.lifecycle(), Lifecycle::Live);
}

#[tokio::test]
async fn test_no_persist_when_disabled() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let ctx = origin.context();

    let _unit = ctx
        .create_synced_scalar(1, Some(ScalarOptions::new("quiet").persist_on_load(false)))
        .unwrap();
    assert_eq!(backend.writes("syncsignal-quiet"), 0);
    assert!(ctx.list_scalar_keys().is_empty());
}

#[tokio::test]
async fn test_stored_value_wins_on_load() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();
    ctx.store().write("syncsignal-lang", &stamped_envelope("fr", 1_000)).unwrap();

    let unit = ctx.create_synced_scalar("en", Some(ScalarOptions::new("lang"))).unwrap();
    assert_eq!(unit.get(), SyncValue::from("fr"));
    assert_eq!(unit.watermark(), Timestamp::from_millis(1_000));
}

#[tokio::test]
async fn test_manual_sync_over_broadcast() {
    let origin = TestOriginBuilder::new().build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let a = tab_a.create_synced_scalar("light", Some(ScalarOptions::new("theme"))).unwrap();
    let b = tab_b.create_synced_scalar("ignored", Some(ScalarOptions::new("theme"))).unwrap();
    assert_eq!(b.get(), SyncValue::from("light"));

    a.set("dark");
    assert_eq!(b.get(), SyncValue::from("light"));
    a.sync();

    eventually("tab b sees dark", || b.get() == SyncValue::from("dark")).await;
    assert_eq!(b.watermark(), a.watermark());
}

#[tokio::test(start_paused = true)]
async fn test_throttle_coalesces_burst() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let ctx = origin.context();
    let options = ScalarOptions::new("burst")
        .auto_sync(true)
        .throttle(Duration::from_millis(50));
    let unit = ctx.create_synced_scalar(0, Some(options)).unwrap();
    assert_eq!(backend.writes("syncsignal-burst"), 1);

    for i in 1..=5 {
        unit.set(i);
        if i < 5 {
            sleep(Duration::from_millis(5)).await;
        }
    }

    // 20ms after the first mutation; then up to 49ms
    assert_eq!(backend.writes("syncsignal-burst"), 1);
    sleep(Duration::from_millis(29)).await;
    assert_eq!(backend.writes("syncsignal-burst"), 1);

    sleep(Duration::from_millis(11)).await;
    assert_eq!(backend.writes("syncsignal-burst"), 2);

    let stored = ctx.store().read("syncsignal-burst").unwrap().unwrap();
    assert_eq!(decode_envelope(&stored).unwrap().data, SyncValue::from(5));

    sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.writes("syncsignal-burst"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_value_does_not_schedule_sync() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let ctx = origin.context();
    let unit = ctx
        .create_synced_scalar("same", Some(ScalarOptions::new("steady").auto_sync(true)))
        .unwrap();

    unit.set("same");
    unit.update(|v| v.clone());
    sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.writes("syncsignal-steady"), 1);
}

#[tokio::test]
async fn test_remote_apply_does_not_echo() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let a = tab_a.create_synced_scalar(0, Some(ScalarOptions::new("echo"))).unwrap();
    let b = tab_b
        .create_synced_scalar(0, Some(ScalarOptions::new("echo").auto_sync(true).throttle(Duration::from_millis(10))))
        .unwrap();
    assert_eq!(backend.writes("syncsignal-echo"), 1);

    a.set(7);
    a.sync();
    eventually("tab b sees 7", || b.get() == SyncValue::from(7)).await;

    sleep(Duration::from_millis(60)).await;
    assert_eq!(backend.writes("syncsignal-echo"), 2);
}

#[tokio::test]
async fn test_auto_sync_reaches_other_context() {
    let origin = TestOriginBuilder::new().build();
    let (tab_a, tab_b) = two_contexts(&origin);
    let options = ScalarOptions::new("volume").auto_sync(true).throttle(Duration::from_millis(10));

    let a = tab_a.create_synced_scalar(10, Some(options.clone())).unwrap();
    let b = tab_b.create_synced_scalar(10, Some(options)).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _sub = b.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    a.set(11);
    eventually("tab b sees 11", || b.get() == SyncValue::from(11)).await;
    assert!(seen.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_missing_options_use_defaults() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();

    let unit = ctx.create_synced_scalar(true, None).unwrap();
    assert_eq!(unit.key(), DEFAULT_SCALAR_KEY);
    assert_eq!(ctx.list_scalar_keys(), vec![DEFAULT_SCALAR_KEY.to_string()]);

    let blank = ctx.create_synced_scalar(1, Some(ScalarOptions::new("")));
    // Falls back to the default key, which is already taken
    assert!(blank.is_err());
}

#[tokio::test]
async fn test_typed_access() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();
    let unit = ctx.create_synced_scalar(vec![1, 2, 3], Some(ScalarOptions::new("list"))).unwrap();

    let values: Vec<i32> = unit.get_as().unwrap();
    assert_eq!(values, vec![1, 2, 3]);
    assert!(unit.get_as::<String>().is_err());
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let backend = Arc::new(CountingBackend::new());
    let origin = TestOriginBuilder::new().with_backend(backend.clone()).build();
    let (tab_a, tab_b) = two_contexts(&origin);

    let a = tab_a.create_synced_scalar(0, Some(ScalarOptions::new("gone"))).unwrap();
    let b = tab_b.create_synced_scalar(0, Some(ScalarOptions::new("gone"))).unwrap();

    b.teardown();
    b.teardown();
    assert_eq!(b.lifecycle(), Lifecycle::TornDown);
    assert!(tab_b.lookup_sync_trigger("gone", Flavor::Scalar).is_none());

    // Local value still usable, but nothing leaves the context
    b.set(3);
    b.sync();
    assert_eq!(b.get(), SyncValue::from(3));
    assert_eq!(backend.writes("syncsignal-gone"), 1);

    a.set(9);
    a.sync();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(b.get(), SyncValue::from(3));
}

#[tokio::test]
async fn test_dropping_last_handle_tears_down() {
    let origin = TestOriginBuilder::new().build();
    let ctx = origin.context();

    let unit = ctx.create_synced_scalar(0, Some(ScalarOptions::new("scoped"))).unwrap();
    let clone = unit.clone();
    drop(unit);
    assert!(ctx.lookup_sync_trigger("scoped", Flavor::Scalar).is_some());

    drop(clone);
    assert!(ctx.lookup_sync_trigger("scoped", Flavor::Scalar).is_none());

    // Key is free again
    assert!(ctx.create_synced_scalar(0, Some(ScalarOptions::new("scoped"))).is_ok());
}
