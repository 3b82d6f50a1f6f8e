//! Happy-path call lifecycle and events after completion.

use crate::prelude::*;
use xbar_core::{MachineId, TransitionKind};
use xbar_engine::EngineError;
use xbar_observe::LifecycleKind;
use xbar_store::{HistoryStore, PersistenceProvider};

#[tokio::test]
async fn happy_path_call_is_archived() {
    let h = harness(call_definition(), with_history(fast_config())).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;
    settle().await;

    // State sequence IDLE -> RINGING -> CONNECTED -> HUNGUP, versions 1..3
    let snapshots = h.observer.snapshots();
    let transitions: Vec<(Option<&str>, &str, u64)> = snapshots
        .iter()
        .filter(|s| s.kind == TransitionKind::Changed)
        .map(|s| (s.state_before.as_deref(), s.state_after.as_str(), s.version))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (Some("IDLE"), "RINGING", 1),
            (Some("RINGING"), "CONNECTED", 2),
            (Some("CONNECTED"), "HUNGUP", 3),
        ]
    );

    // Exactly one Archived notification
    let archived: Vec<_> = h
        .observer
        .lifecycle_kinds()
        .into_iter()
        .filter(|k| *k == LifecycleKind::Archived)
        .collect();
    assert_eq!(archived.len(), 1);

    // The active row is gone, the history row has the final state
    assert!(!h.store.exists(&id).await.unwrap());
    let row = h.history.load(&id).await.unwrap().unwrap();
    assert_eq!(row.row.current_state, "HUNGUP");
    assert!(row.row.complete);
}

#[tokio::test]
async fn event_to_archived_machine_is_dropped() {
    let h = harness(call_definition(), with_history(fast_config())).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;

    // The machine is archived; a new Incoming has nowhere to go
    let err = h
        .registry
        .route_event(&id, incoming(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownMachine(_)));

    // No new row appeared in the active store
    assert!(!h.store.exists(&id).await.unwrap());
    assert!(!h.registry.is_live(&id));
}

#[tokio::test]
async fn lifecycle_notices_for_a_created_machine() {
    let h = harness(call_definition(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.drain().await;
    settle().await;

    let kinds = h.observer.lifecycle_kinds();
    assert_eq!(
        kinds,
        vec![LifecycleKind::Created, LifecycleKind::Registered]
    );
}
