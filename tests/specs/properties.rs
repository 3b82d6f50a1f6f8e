//! Universal properties that must hold for any run.

use crate::prelude::*;
use serde_json::json;
use std::time::Duration;
use xbar_core::{MachineDefinition, MachineId, TransitionKind};
use xbar_engine::EngineError;

/// Snapshot versions form a strictly increasing sequence starting at 1.
#[tokio::test]
async fn versions_are_monotonic_per_machine() {
    let h = harness(call_definition(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;
    settle().await;

    let versions: Vec<u64> = h
        .observer
        .snapshots()
        .iter()
        .filter(|s| s.kind == TransitionKind::Changed)
        .map(|s| s.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

/// Concurrent routing for one id never yields two live instances.
#[tokio::test]
async fn one_live_instance_per_id() {
    let h = harness(call_definition(), fast_config()).await;
    let id = MachineId::new("call-1");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = h.registry.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let make = idle_factory();
            registry.route_event(&id, incoming(), Some(&make)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    h.registry.drain().await;

    assert_eq!(h.registry.live_count(), 1);
}

/// Events enqueued in order are observed in version order.
#[tokio::test]
async fn dispatch_is_serialized_per_machine() {
    let definition = MachineDefinition::builder("counter")
        .state("COUNTING", |s| {
            s.on_stay("count:tick", |ctx, event| {
                let n = ctx.get("total").and_then(|v| v.as_u64()).unwrap_or(0);
                let add = event.payload["n"].as_u64().unwrap_or(0);
                ctx.set("total", json!(n + add));
                Ok(())
            })
        })
        .build()
        .unwrap();
    let h = harness(definition, fast_config()).await;
    let id = MachineId::new("counter-1");
    let make = |id: &MachineId, now_us: u64| {
        xbar_core::MachineContext::new(id.clone(), "COUNTING", now_us)
    };

    for n in 1..=8u64 {
        h.registry
            .route_event(
                &id,
                xbar_core::Event::new("count:tick", json!({ "n": n })),
                Some(&make),
            )
            .await
            .unwrap();
    }
    h.registry.drain().await;
    settle().await;

    let snapshots = h.observer.snapshots();
    let versions: Vec<u64> = snapshots.iter().map(|s| s.version).collect();
    assert_eq!(versions, (1..=8).collect::<Vec<u64>>());

    // Payloads arrive in enqueue order too
    let payloads: Vec<u64> = snapshots
        .iter()
        .filter_map(|s| s.event_payload["n"].as_u64())
        .collect();
    assert_eq!(payloads, (1..=8).collect::<Vec<u64>>());
}

/// Rehydration must not re-run the restored state's entry action.
#[tokio::test]
async fn rehydration_runs_entry_actions_at_most_once() {
    let definition = MachineDefinition::builder("call")
        .initial("IDLE")
        .state("IDLE", |s| s.on("call:incoming", "WAITING"))
        .state("WAITING", |s| {
            s.offline()
                .entry(|ctx, _| {
                    let n = ctx.get("entries").and_then(|v| v.as_u64()).unwrap_or(0);
                    ctx.set("entries", json!(n + 1));
                    Ok(())
                })
                .on("call:hangup", "DONE")
        })
        .state("DONE", |s| s.terminal())
        .build()
        .unwrap();
    let h = harness(definition, fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.drain().await;
    assert!(!h.registry.is_live(&id));

    // Rehydrate via a stray event; WAITING ignores it but the machine is
    // back in memory
    h.registry
        .route_event(&id, xbar_core::Event::of("call:noise"), None)
        .await
        .unwrap();
    h.registry.drain().await;
    settle().await;

    let last = h.observer.snapshots().last().cloned().unwrap();
    let context = xbar_core::decode_context(&last.context_after).unwrap();
    assert_eq!(context.get("entries"), Some(&json!(1)));
}

/// After a final state, no further state-changing transition is recorded.
#[tokio::test]
async fn final_state_is_immutable() {
    let h = harness(call_definition(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, hangup(), None).await.unwrap();
    h.registry.drain().await;
    settle().await;
    let changed_before = h
        .observer
        .snapshots()
        .iter()
        .filter(|s| s.kind == TransitionKind::Changed)
        .count();

    // Events aimed at the completed machine go nowhere
    let err = h
        .registry
        .route_event(&id, answer(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownMachine(_)));
    h.registry.drain().await;
    settle().await;

    let changed_after = h
        .observer
        .snapshots()
        .iter()
        .filter(|s| s.kind == TransitionKind::Changed)
        .count();
    assert_eq!(changed_before, changed_after);
}

/// A machine evicted mid-timeout resumes the remaining time, not the full
/// duration.
#[tokio::test]
async fn remaining_timeout_is_rescheduled_on_rehydration() {
    let h = harness(call_definition_offline_connected(), fast_config()).await;
    let id = MachineId::new("call-1");
    let make = idle_factory();

    h.registry.route_event(&id, incoming(), Some(&make)).await.unwrap();
    h.registry.route_event(&id, answer(), None).await.unwrap();
    h.registry.drain().await;

    // 25s of the 30s CONNECTED timeout pass while evicted
    h.clock.advance(Duration::from_secs(25));
    h.registry
        .route_event(&id, xbar_core::Event::of("call:noise"), None)
        .await
        .unwrap();
    h.registry.drain().await;
    assert!(h.registry.is_live(&id));

    // 6 more seconds cross the original 30s boundary
    h.clock.advance(Duration::from_secs(6));
    h.registry.poll_timers().await;
    h.registry.drain().await;
    settle().await;

    let last = h.observer.snapshots().last().cloned().unwrap();
    assert_eq!(last.event_type, xbar_core::TIMEOUT_EVENT_TYPE);
    assert_eq!(last.state_before.as_deref(), Some("CONNECTED"));
    assert_eq!(last.state_after, "IDLE");
}
