//! History archival: atomic move, crash recovery, fatal escalation.

use crate::prelude::*;
use xbar_core::{FakeClock, MachineContext, MachineId};
use xbar_engine::{EngineError, Registry};
use xbar_observe::{LifecycleKind, RecordingObserver};
use xbar_store::{
    codec, FailingHistoryStore, HistoryStore, MemoryHistoryStore, MemoryStore,
    PersistenceProvider,
};

/// No id may have a row in both stores once archival settles.
#[tokio::test]
async fn archival_moves_the_row_atomically() {
    let h = harness(call_definition(), with_history(fast_config())).await;
    let make = idle_factory();

    for n in 0..5 {
        let id = MachineId::new(format!("call-{n}"));
        h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
        h.registry.route_event(&id, answer(), None).await.unwrap();
        h.registry.route_event(&id, hangup(), None).await.unwrap();
    }
    h.registry.drain().await;

    for n in 0..5 {
        let id = MachineId::new(format!("call-{n}"));
        assert!(!h.store.exists(&id).await.unwrap());
        assert!(h.history.load(&id).await.unwrap().is_some());
    }
    assert!(h.store.is_empty());
}

/// A completed row left in the active store by a crash is re-archived on
/// the next start, before traffic is served.
#[tokio::test]
async fn startup_scan_recovers_interrupted_archivals() {
    let clock = FakeClock::new();
    let store = MemoryStore::new();
    let history = MemoryHistoryStore::new();

    let mut context = MachineContext::new(MachineId::new("call-crashed"), "HUNGUP", 50);
    context.complete = true;
    store
        .save(codec::record_from_context(&context, 50, 50).unwrap())
        .await
        .unwrap();

    let registry = Registry::start(
        call_definition(),
        store.clone(),
        history.clone(),
        with_history(fast_config()),
        clock,
    )
    .await
    .unwrap();
    registry.drain().await;

    let id = MachineId::new("call-crashed");
    assert!(!store.exists(&id).await.unwrap());
    let row = history.load(&id).await.unwrap().unwrap();
    assert_eq!(row.row.current_state, "HUNGUP");
}

/// A history store that always fails: three attempts, then the registry
/// goes down rather than losing the machine.
#[tokio::test]
async fn irrecoverable_archival_failure_is_fatal() {
    let clock = FakeClock::new();
    let history = FailingHistoryStore::new();
    let registry = Registry::start(
        call_definition(),
        MemoryStore::new(),
        history.clone(),
        with_history(fast_config()),
        clock,
    )
    .await
    .unwrap();
    let observer = RecordingObserver::new();
    registry.subscribe(observer.clone(), 256);

    let id = MachineId::new("call-1");
    let make = idle_factory();
    registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    registry.route_event(&id, answer(), None).await.unwrap();
    registry.route_event(&id, hangup(), None).await.unwrap();
    registry.drain().await;

    registry.fatal_signal().wait().await;
    settle().await;

    assert_eq!(history.insert_attempts(), 3);
    assert!(registry.fatal_signal().is_set());
    assert!(observer
        .lifecycle_kinds()
        .contains(&LifecycleKind::ShutdownStarted));

    // New routing is refused during the forced shutdown
    let err = registry
        .route_event(&MachineId::new("call-2"), incoming(), Some(&make))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ShuttingDown(_)));
}

/// Retention prunes archived rows older than the configured window.
#[tokio::test]
async fn retention_prunes_old_history() {
    const DAY_US: u64 = 86_400_000_000;
    let h = harness(call_definition(), with_history(fast_config())).await;
    let make = idle_factory();

    let id = MachineId::new("call-old");
    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;
    assert!(h.history.load(&id).await.unwrap().is_some());

    // 31 days later the row falls out of the default 30-day window
    h.clock.advance(std::time::Duration::from_micros(31 * DAY_US));
    let removed = h.registry.run_retention_once().await.unwrap();
    assert_eq!(removed, 1);
    assert!(h.history.load(&id).await.unwrap().is_none());
}
