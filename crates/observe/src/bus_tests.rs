// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{LifecycleKind, Observer, ObserverError, RecordingObserver};
use async_trait::async_trait;
use std::time::Duration;
use xbar_core::{MachineId, MachineStatus, RunId, TransitionKind, TransitionSnapshot};

fn transition(version: u64) -> Notice {
    Notice::Transition(Box::new(TransitionSnapshot {
        machine_id: MachineId::new("call-1"),
        version,
        run_id: RunId::new("run-1"),
        kind: TransitionKind::Changed,
        state_before: Some("IDLE".into()),
        state_after: "RINGING".into(),
        event_type: "call:incoming".into(),
        event_payload: serde_json::Value::Null,
        context_before: None,
        context_after: String::new(),
        transition_nanos: 0,
        timestamp_us: 0,
        machine_online: true,
        state_offline: false,
        registry_status: MachineStatus::Running,
        error: None,
    }))
}

fn lifecycle() -> Notice {
    Notice::lifecycle(LifecycleKind::Registered, MachineId::new("call-1"), 0)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn delivers_to_all_subscribers() {
    let bus = ObserverBus::new(1, false);
    let a = RecordingObserver::new();
    let b = RecordingObserver::new();
    bus.subscribe(a.clone(), 16);
    bus.subscribe(b.clone(), 16);
    assert_eq!(bus.subscriber_count(), 2);

    bus.publish(transition(1));
    bus.publish(lifecycle());
    settle().await;

    assert_eq!(a.notices().len(), 2);
    assert_eq!(b.notices().len(), 2);
}

#[tokio::test]
async fn samples_one_in_n_transitions() {
    let bus = ObserverBus::new(3, false);
    let observer = RecordingObserver::new();
    bus.subscribe(observer.clone(), 64);

    for v in 1..=9 {
        bus.publish(transition(v));
    }
    settle().await;

    let versions: Vec<u64> = observer.snapshots().iter().map(|s| s.version).collect();
    assert_eq!(versions, [1, 4, 7]);
}

#[tokio::test]
async fn lifecycle_notices_are_never_sampled() {
    let bus = ObserverBus::new(100, false);
    let observer = RecordingObserver::new();
    bus.subscribe(observer.clone(), 64);

    for _ in 0..5 {
        bus.publish(lifecycle());
    }
    settle().await;

    assert_eq!(observer.lifecycle_kinds().len(), 5);
}

#[tokio::test]
async fn debug_log_all_overrides_sampling() {
    let bus = ObserverBus::new(100, true);
    let observer = RecordingObserver::new();
    bus.subscribe(observer.clone(), 64);

    for v in 1..=5 {
        bus.publish(transition(v));
    }
    settle().await;

    assert_eq!(observer.snapshots().len(), 5);
}

#[tokio::test]
async fn unsubscribe_detaches() {
    let bus = ObserverBus::new(1, false);
    let observer = RecordingObserver::new();
    let handle = bus.subscribe(observer.clone(), 16);

    bus.publish(lifecycle());
    settle().await;
    bus.unsubscribe(handle);
    assert_eq!(bus.subscriber_count(), 0);

    bus.publish(lifecycle());
    settle().await;
    assert_eq!(observer.notices().len(), 1);
}

/// Observer that never finishes a delivery, so its buffer fills up.
struct StuckObserver;

#[async_trait]
impl Observer for StuckObserver {
    async fn notify(&self, _notice: &Notice) -> Result<(), ObserverError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn slow_subscriber_drops_notices_without_blocking() {
    let bus = ObserverBus::new(1, false);
    bus.subscribe(StuckObserver, 1);

    // First notice is consumed by the stuck delivery, second fills the
    // buffer, the rest are dropped.
    for _ in 0..5 {
        bus.publish(lifecycle());
    }
    settle().await;

    assert!(bus.dropped() >= 3);
    assert_eq!(bus.subscriber_count(), 1);
}
