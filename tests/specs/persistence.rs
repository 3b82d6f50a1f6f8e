//! Persistence retry behavior and eviction idempotency.

use crate::prelude::*;
use xbar_core::{FakeClock, MachineId};
use xbar_engine::Registry;
use xbar_observe::{LifecycleKind, RecordingObserver};
use xbar_store::{FlakyStore, MemoryHistoryStore, PersistenceProvider};

/// A save that fails once then succeeds: the eviction retries, succeeds,
/// and loses nothing.
#[tokio::test]
async fn transient_save_failure_is_retried_once() {
    let clock = FakeClock::new();
    let store = FlakyStore::failing_saves(1);
    let registry = Registry::start(
        call_definition_offline_connected(),
        store.clone(),
        MemoryHistoryStore::new(),
        fast_config(),
        clock.clone(),
    )
    .await
    .unwrap();
    let observer = RecordingObserver::new();
    registry.subscribe(observer.clone(), 256);

    let id = MachineId::new("call-1");
    let make = idle_factory();
    registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    registry.route_event(&id, answer(), None).await.unwrap();
    registry.drain().await;
    settle().await;

    // Two attempts: the injected failure, then the success
    assert_eq!(store.save_attempts(), 2);
    assert!(!registry.is_live(&id));

    let row = store.inner().load(&id).await.unwrap().unwrap();
    assert_eq!(row.current_state, "CONNECTED");

    let evicted: Vec<_> = observer
        .lifecycle_kinds()
        .into_iter()
        .filter(|k| *k == LifecycleKind::Evicted)
        .collect();
    assert_eq!(evicted.len(), 1);
}

/// Exhausted retries leave the machine live rather than losing it.
#[tokio::test]
async fn exhausted_save_retries_keep_the_machine_live() {
    let clock = FakeClock::new();
    let store = FlakyStore::failing_saves(10);
    let registry = Registry::start(
        call_definition_offline_connected(),
        store.clone(),
        MemoryHistoryStore::new(),
        fast_config(),
        clock.clone(),
    )
    .await
    .unwrap();

    let id = MachineId::new("call-1");
    let make = idle_factory();
    registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    registry.route_event(&id, answer(), None).await.unwrap();
    registry.drain().await;

    // Default budget is 3 attempts
    assert_eq!(store.save_attempts(), 3);
    assert!(registry.is_live(&id), "machine must never be silently lost");
    assert!(!store.inner().exists(&id).await.unwrap());
}

#[tokio::test]
async fn evicting_twice_matches_evicting_once() {
    let h = harness(call_definition(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.drain().await;
    assert!(h.registry.is_live(&id));

    h.registry.evict(&id).await.unwrap();
    let row_after_first = h.store.load(&id).await.unwrap().unwrap();
    assert!(!h.registry.is_live(&id));

    h.registry.evict(&id).await.unwrap();
    let row_after_second = h.store.load(&id).await.unwrap().unwrap();
    assert!(!h.registry.is_live(&id));
    assert_eq!(row_after_first, row_after_second);
}
