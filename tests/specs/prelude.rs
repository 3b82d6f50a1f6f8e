//! Shared fixtures for the behavioral specs.

use std::time::Duration;
use xbar_core::{
    Event, FakeClock, MachineContext, MachineDefinition, MachineId, RuntimeConfig,
};
use xbar_engine::Registry;
use xbar_observe::RecordingObserver;
use xbar_store::{MemoryHistoryStore, MemoryStore};

/// The call machine: IDLE -> RINGING (30s timeout back to IDLE) ->
/// CONNECTED -> HUNGUP (final).
pub fn call_definition() -> MachineDefinition {
    MachineDefinition::builder("call")
        .initial("IDLE")
        .state("IDLE", |s| s.on("call:incoming", "RINGING"))
        .state("RINGING", |s| {
            s.on("call:answer", "CONNECTED")
                .on("call:hangup", "HUNGUP")
                .timeout(Duration::from_secs(30), "IDLE")
        })
        .state("CONNECTED", |s| s.on("call:hangup", "HUNGUP"))
        .state("HUNGUP", |s| s.terminal())
        .build()
        .unwrap()
}

/// Same machine, but CONNECTED is an offline state with a 30s timeout
/// back to IDLE.
pub fn call_definition_offline_connected() -> MachineDefinition {
    MachineDefinition::builder("call")
        .initial("IDLE")
        .state("IDLE", |s| s.on("call:incoming", "RINGING"))
        .state("RINGING", |s| {
            s.on("call:answer", "CONNECTED")
                .on("call:hangup", "HUNGUP")
                .timeout(Duration::from_secs(30), "IDLE")
        })
        .state("CONNECTED", |s| {
            s.offline()
                .on("call:hangup", "HUNGUP")
                .timeout(Duration::from_secs(30), "IDLE")
        })
        .state("HUNGUP", |s| s.terminal())
        .build()
        .unwrap()
}

/// Defaults with millisecond retry delays so retry paths run fast.
pub fn fast_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.persistence.retry_base_delay_ms = 1;
    config.history.retry_base_delay_ms = 1;
    config.dispatcher.enqueue_deadline_ms = 200;
    config
}

pub fn with_history(mut config: RuntimeConfig) -> RuntimeConfig {
    config.history.enabled = true;
    config
}

/// Context factory used for machines created on first contact.
pub fn idle_factory() -> impl Fn(&MachineId, u64) -> MachineContext {
    |id: &MachineId, now_us: u64| MachineContext::new(id.clone(), "IDLE", now_us)
}

pub fn incoming() -> Event {
    Event::of("call:incoming")
}

pub fn answer() -> Event {
    Event::of("call:answer")
}

pub fn hangup() -> Event {
    Event::of("call:hangup")
}

/// A registry over memory stores with an attached recording observer.
pub struct Harness {
    pub registry: Registry<MemoryStore, MemoryHistoryStore, FakeClock>,
    pub store: MemoryStore,
    pub history: MemoryHistoryStore,
    pub clock: FakeClock,
    pub observer: RecordingObserver,
}

pub async fn harness(definition: MachineDefinition, config: RuntimeConfig) -> Harness {
    let clock = FakeClock::new();
    let store = MemoryStore::new();
    let history = MemoryHistoryStore::new();
    let registry = Registry::start(
        definition,
        store.clone(),
        history.clone(),
        config,
        clock.clone(),
    )
    .await
    .unwrap();
    let observer = RecordingObserver::new();
    registry.subscribe(observer.clone(), 256);
    Harness {
        registry,
        store,
        history,
        clock,
        observer,
    }
}

/// Let the observer forwarding tasks catch up.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}
