//! Offline states: eviction, rehydration, and timeout survival.

use crate::prelude::*;
use std::time::Duration;
use xbar_core::{Clock, MachineId, TransitionKind, TIMEOUT_EVENT_TYPE};
use xbar_store::PersistenceProvider;

#[tokio::test]
async fn offline_entry_persists_and_evicts() {
    let h = harness(call_definition_offline_connected(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.clock.advance(Duration::from_millis(100));
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.drain().await;

    assert!(!h.registry.is_live(&id));
    let row = h.store.load(&id).await.unwrap().unwrap();
    assert_eq!(row.current_state, "CONNECTED");
    assert_eq!(row.last_state_change_us, h.clock.epoch_us());
}

/// An event arriving after the offline state's timeout expired: the
/// synthetic timeout transition comes first, then the event is processed
/// against the post-timeout state.
#[tokio::test]
async fn elapsed_timeout_fires_before_the_arriving_event() {
    let h = harness(call_definition_offline_connected(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.clock.advance(Duration::from_millis(100));
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.drain().await;
    assert!(!h.registry.is_live(&id));

    // 34.9s in CONNECTED, past its 30s timeout
    h.clock.advance(Duration::from_millis(34_900));
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;
    settle().await;

    let snapshots = h.observer.snapshots();
    let tail: Vec<(TransitionKind, &str, &str)> = snapshots
        .iter()
        .skip_while(|s| s.kind != TransitionKind::Rehydrated)
        .map(|s| (s.kind, s.event_type.as_str(), s.state_after.as_str()))
        .collect();
    assert_eq!(
        tail,
        vec![
            (TransitionKind::Rehydrated, "sys:rehydrate", "CONNECTED"),
            (TransitionKind::Changed, TIMEOUT_EVENT_TYPE, "IDLE"),
            (TransitionKind::Ignored, "call:hangup", "IDLE"),
        ]
    );

    // Final observable state: IDLE, live
    assert!(h.registry.is_live(&id));
}

/// An event arriving before the timeout expires is processed normally and
/// no synthetic timeout fires.
#[tokio::test]
async fn event_before_timeout_expiry_wins() {
    let h = harness(call_definition_offline_connected(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.clock.advance(Duration::from_millis(100));
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.drain().await;

    // Only 20s in CONNECTED
    h.clock.advance(Duration::from_secs(20));
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;
    settle().await;

    let snapshots = h.observer.snapshots();
    assert!(
        !snapshots.iter().any(|s| s.event_type == TIMEOUT_EVENT_TYPE),
        "no synthetic timeout expected"
    );
    let last = snapshots.last().unwrap();
    assert_eq!(last.state_before.as_deref(), Some("CONNECTED"));
    assert_eq!(last.state_after, "HUNGUP");
}

/// A timer armed before eviction must not fire against the rehydrated
/// activation with a stale tag.
#[tokio::test]
async fn live_timer_is_cancelled_on_eviction() {
    let h = harness(call_definition_offline_connected(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.drain().await;

    // The eviction cancelled CONNECTED's live timer: advancing time and
    // polling delivers nothing
    h.clock.advance(Duration::from_secs(31));
    h.registry.poll_timers().await;
    h.registry.drain().await;
    settle().await;

    assert!(!h.registry.is_live(&id));
    let timeouts: Vec<_> = h
        .observer
        .snapshots()
        .into_iter()
        .filter(|s| s.event_type == TIMEOUT_EVENT_TYPE)
        .collect();
    assert!(timeouts.is_empty());
}
