// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The registry: lifecycle owner of every machine in one namespace.
//!
//! Routes events to per-machine queues, persists and evicts machines that
//! enter offline states, rehydrates absent machines when traffic returns,
//! and hands completed machines to the archival workers. The live map is
//! the single source of truth for which instances exist: at most one
//! instance per id, owned by exactly one dispatcher.

use crate::archive::{self, ArchiveJob};
use crate::dispatcher::{Dispatcher, EnqueueError};
use crate::error::EngineError;
use crate::kernel::{Effect, MachineInstance};
use crate::rehydrate;
use crate::retention;
use crate::scheduler::{TimeoutScheduler, TIMER_GRANULARITY};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};
use xbar_core::{
    Clock, Event, MachineContext, MachineDefinition, MachineId, MachineStatus, RuntimeConfig,
};
use xbar_observe::{LifecycleKind, Notice, Observer, ObserverBus, SubscriberHandle};
use xbar_store::{codec, HistoryStore, MachineRecord, PersistenceProvider, StoreError};

/// Recently evicted machines kept for observer inspection.
const OFFLINE_DEBUG_CAP: usize = 128;

/// Capacity of the archival queue.
const ARCHIVE_QUEUE_CAP: usize = 256;

/// Rounds of enqueue-vs-evict races a single route tolerates before
/// giving up.
const MAX_ROUTE_ATTEMPTS: u32 = 3;

/// Builds the persistent context for a machine created on first contact.
pub trait ContextFactory: Send + Sync {
    fn create(&self, id: &MachineId, now_us: u64) -> MachineContext;
}

impl<F> ContextFactory for F
where
    F: Fn(&MachineId, u64) -> MachineContext + Send + Sync,
{
    fn create(&self, id: &MachineId, now_us: u64) -> MachineContext {
        self(id, now_us)
    }
}

/// Raised once when an irrecoverable failure forces the registry down.
/// The embedding process awaits this to exit non-zero.
#[derive(Clone, Default)]
pub struct FatalSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl FatalSignal {
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolve once a fatal failure has been raised.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct MachineCell {
    pub(crate) machine: Arc<Mutex<MachineInstance>>,
    pub(crate) dispatcher: Dispatcher,
}

/// Bounded cache of recently evicted contexts, kept only while at least
/// one observer is connected.
struct OfflineDebugCache {
    order: VecDeque<MachineId>,
    entries: HashMap<MachineId, MachineContext>,
}

impl OfflineDebugCache {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, context: MachineContext) {
        let id = context.id.clone();
        if self.entries.insert(id.clone(), context).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > OFFLINE_DEBUG_CAP {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn get(&self, id: &MachineId) -> Option<MachineContext> {
        self.entries.get(id).cloned()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

pub(crate) struct Inner<P, H, C> {
    namespace: String,
    pub(crate) definition: Arc<MachineDefinition>,
    pub(crate) store: Arc<P>,
    pub(crate) history: Arc<H>,
    pub(crate) bus: ObserverBus,
    pub(crate) config: RuntimeConfig,
    pub(crate) clock: C,
    pub(crate) live: Mutex<HashMap<MachineId, MachineCell>>,
    pub(crate) archiving: Mutex<HashSet<MachineId>>,
    rehydration_locks: Mutex<HashMap<MachineId, Arc<tokio::sync::Mutex<()>>>>,
    offline_debug: Mutex<OfflineDebugCache>,
    pub(crate) scheduler: Mutex<TimeoutScheduler>,
    pending: AtomicUsize,
    pending_idle: Notify,
    archive_tx: Mutex<Option<mpsc::Sender<ArchiveJob>>>,
    pub(crate) archive_backlog: AtomicUsize,
    pub(crate) archive_idle: Notify,
    pub(crate) fatal: FatalSignal,
    shutting_down: AtomicBool,
}

impl<P, H, C> Inner<P, H, C>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn rehydration_lock(&self, id: &MachineId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.rehydration_locks.lock();
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    fn prune_rehydration_lock(&self, id: &MachineId) {
        // Best-effort: drop the entry once nobody else holds it
        let mut locks = self.rehydration_locks.lock();
        if let Some(lock) = locks.get(id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(id);
            }
        }
    }

    /// Route one event to its machine, creating or rehydrating it as
    /// needed. The primary entry point of the registry.
    pub(crate) async fn route_event(
        self: &Arc<Self>,
        id: &MachineId,
        mut event: Event,
        factory: Option<&dyn ContextFactory>,
    ) -> Result<(), EngineError> {
        if self.is_shutting_down() {
            return Err(EngineError::ShuttingDown(self.namespace.clone()));
        }
        if event.timestamp_us == 0 {
            event.timestamp_us = self.clock.epoch_us();
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            if attempts > MAX_ROUTE_ATTEMPTS {
                return Err(EngineError::EvictedRetry(id.clone()));
            }

            // Fast path: the machine is live
            let dispatcher = self.live.lock().get(id).map(|cell| cell.dispatcher.clone());
            if let Some(dispatcher) = dispatcher {
                match self.enqueue(&dispatcher, event).await {
                    Ok(()) => return Ok(()),
                    Err(EnqueueError::Full) => return Err(EngineError::QueueFull(id.clone())),
                    Err(EnqueueError::Closed(returned)) => {
                        // Lost a race with an eviction; try again, this
                        // round through the rehydration path
                        debug!(machine = %id, "queue closed mid-route, retrying");
                        event = returned;
                        continue;
                    }
                }
            }

            // Slow path: create or rehydrate under the per-id lock
            let lock = self.rehydration_lock(id);
            {
                let _guard = lock.lock().await;

                if self.live.lock().contains_key(id) {
                    continue; // appeared while we waited; back to the fast path
                }

                if self.archiving.lock().contains(id) {
                    warn!(machine = %id, "event for archiving machine dropped");
                    return Err(EngineError::UnknownMachine(id.clone()));
                }

                match self.store.load(id).await {
                    Ok(None) => {
                        let factory =
                            factory.ok_or_else(|| EngineError::UnknownMachine(id.clone()))?;
                        let mut context = factory.create(id, self.clock.epoch_us());
                        context.id = id.clone();
                        let instance =
                            MachineInstance::new(Arc::clone(&self.definition), context)?;
                        self.register_cell(Arc::new(Mutex::new(instance)), true)?;
                    }
                    Ok(Some(record)) if record.complete => {
                        warn!(machine = %id, "event for completed machine dropped");
                        return Err(EngineError::UnknownMachine(id.clone()));
                    }
                    Ok(Some(record)) => rehydrate::rehydrate(self, id, record).await?,
                    Err(e) => {
                        if e.is_fatal() {
                            self.escalate_fatal(&format!("load failed for {id}: {e}"));
                        }
                        return Err(e.into());
                    }
                }
            }
            self.prune_rehydration_lock(id);
            // Back to the fast path to enqueue
        }
    }

    async fn enqueue(&self, dispatcher: &Dispatcher, event: Event) -> Result<(), EnqueueError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let result = dispatcher
            .enqueue(event, self.config.enqueue_deadline())
            .await;
        if result.is_err() {
            self.event_done();
        }
        result
    }

    pub(crate) fn event_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.pending_idle.notify_waiters();
        }
    }

    /// Resolve once every enqueued event has been fully processed.
    pub(crate) async fn wait_idle(&self) {
        loop {
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.pending_idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn archive_done(&self) {
        if self.archive_backlog.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.archive_idle.notify_waiters();
        }
    }

    pub(crate) async fn wait_archive_idle(&self) {
        loop {
            if self.archive_backlog.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.archive_idle.notified();
            if self.archive_backlog.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Insert a machine into the live map and spawn its consumer task.
    pub(crate) fn register_cell(
        self: &Arc<Self>,
        machine: Arc<Mutex<MachineInstance>>,
        created: bool,
    ) -> Result<(), EngineError> {
        let id = machine.lock().id().clone();

        let mut live = self.live.lock();
        if live.contains_key(&id) {
            return Err(EngineError::DuplicateMachine(id));
        }

        let inner = Arc::clone(self);
        let consumer_id = id.clone();
        let consumer_machine = Arc::clone(&machine);
        let dispatcher = Dispatcher::spawn(self.config.dispatcher.queue_capacity, move |event| {
            let inner = Arc::clone(&inner);
            let machine = Arc::clone(&consumer_machine);
            let id = consumer_id.clone();
            async move {
                inner.process_event(&id, &machine, event).await;
                inner.event_done();
            }
        });

        live.insert(id.clone(), MachineCell { machine, dispatcher });
        drop(live);

        let now = self.clock.epoch_us();
        if created {
            self.bus
                .publish(Notice::lifecycle(LifecycleKind::Created, id.clone(), now));
        }
        self.bus
            .publish(Notice::lifecycle(LifecycleKind::Registered, id, now));
        Ok(())
    }

    /// Fire one event on one machine and execute the resulting effects.
    /// Runs on the machine's consumer task.
    async fn process_event(
        self: &Arc<Self>,
        id: &MachineId,
        machine: &Arc<Mutex<MachineInstance>>,
        event: Event,
    ) {
        let include_before = self.config.observer.include_context_before;
        let result = machine.lock().fire(&event, &self.clock, include_before);
        match result {
            Ok(fire) => self.execute_effects(id, machine, fire.effects).await,
            Err(EngineError::Stopped { .. }) => {
                // The machine was evicted with this event still queued:
                // reroute it so it triggers a rehydration instead
                if let Err(e) = self.route_event(id, event, None).await {
                    warn!(machine = %id, error = %e, "reroute after eviction failed");
                }
            }
            Err(EngineError::FinalState { .. }) => {
                warn!(machine = %id, event = %event.event_type, "event after final state rejected");
            }
            Err(e) => {
                error!(machine = %id, error = %e, "event dispatch failed");
            }
        }
    }

    pub(crate) async fn execute_effects(
        self: &Arc<Self>,
        id: &MachineId,
        machine: &Arc<Mutex<MachineInstance>>,
        effects: Vec<Effect>,
    ) {
        for effect in effects {
            match effect {
                Effect::ArmTimeout { duration, version } => {
                    self.scheduler
                        .lock()
                        .arm(id.clone(), version, duration, self.clock.now());
                }
                Effect::CancelTimeout => self.scheduler.lock().cancel(id),
                Effect::Publish(notice) => self.bus.publish(notice),
                Effect::PersistAndEvict => self.persist_and_evict(id, machine).await,
                Effect::Archive => self.begin_archival(id, machine).await,
            }
        }
    }

    /// Offline-state path: persist the context, then drop the machine from
    /// memory. On terminal save failure the machine stays live — a machine
    /// is never silently lost.
    pub(crate) async fn persist_and_evict(
        self: &Arc<Self>,
        id: &MachineId,
        machine: &Arc<Mutex<MachineInstance>>,
    ) {
        let context = {
            let mut m = machine.lock();
            m.set_status(MachineStatus::Suspended);
            m.context().clone()
        };
        let now = self.clock.epoch_us();
        let record = match codec::record_from_context(&context, now, now) {
            Ok(record) => record,
            Err(e) => {
                self.escalate_fatal(&format!("context serialization failed for {id}: {e}"));
                return;
            }
        };

        match self.save_with_retry(record).await {
            Ok(()) => {
                self.scheduler.lock().cancel(id);
                self.live.lock().remove(id);
                machine.lock().set_status(MachineStatus::Evicted);
                self.remember_offline(&context);
                self.bus
                    .publish(Notice::lifecycle(LifecycleKind::Evicted, id.clone(), now));
                info!(machine = %id, state = %context.current_state, "persisted and evicted");
            }
            Err(e) if e.is_fatal() => {
                self.escalate_fatal(&format!("persist failed for {id}: {e}"));
            }
            Err(e) => {
                error!(machine = %id, error = %e, "persist failed after retries; machine stays live");
                machine.lock().set_status(MachineStatus::Running);
            }
        }
    }

    async fn save_with_retry(&self, record: MachineRecord) -> Result<(), StoreError> {
        let attempts = self.config.persistence.retry_attempts.max(1);
        let mut delay = self.config.retry_base_delay();
        let mut attempt = 1;
        loop {
            match self.store.save(record.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        machine = %record.machine_id,
                        attempt,
                        error = %e,
                        "save attempt failed"
                    );
                    if attempt >= attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    fn remember_offline(&self, context: &MachineContext) {
        let mut cache = self.offline_debug.lock();
        if self.bus.subscriber_count() == 0 {
            cache.clear();
            return;
        }
        cache.insert(context.clone());
    }

    pub(crate) fn offline_debug(&self, id: &MachineId) -> Option<MachineContext> {
        self.offline_debug.lock().get(id)
    }

    pub(crate) fn clear_offline_debug(&self) {
        self.offline_debug.lock().clear();
    }

    /// Final-state path: move the machine out of the live map and queue it
    /// for archival. Until the archival commits, the id sits in the
    /// archiving set and accepts no events.
    async fn begin_archival(
        self: &Arc<Self>,
        id: &MachineId,
        machine: &Arc<Mutex<MachineInstance>>,
    ) {
        let context = machine.lock().context().clone();
        self.archiving.lock().insert(id.clone());
        self.live.lock().remove(id);
        self.scheduler.lock().cancel(id);

        let now = self.clock.epoch_us();
        let record = match codec::record_from_context(&context, now, now) {
            Ok(record) => record,
            Err(e) => {
                self.escalate_fatal(&format!("context serialization failed for {id}: {e}"));
                return;
            }
        };

        let tx = self.archive_tx.lock().clone();
        match tx {
            Some(tx) => {
                self.archive_backlog.fetch_add(1, Ordering::SeqCst);
                if tx
                    .send(ArchiveJob {
                        record,
                        archived_at_us: now,
                    })
                    .await
                    .is_err()
                {
                    self.archive_done();
                    self.escalate_fatal("archive queue closed");
                }
            }
            None => {
                // History disabled: keep the completed row in the active
                // store so the id is never resurrected
                if let Err(e) = self.store.save(record).await {
                    error!(machine = %id, error = %e, "failed to persist completed machine");
                }
                self.archiving.lock().remove(id);
            }
        }
    }

    /// Deliver due timers through the per-machine queues.
    pub(crate) async fn poll_timers(self: &Arc<Self>) {
        let fired = self.scheduler.lock().fired(self.clock.now());
        for (id, armed_version) in fired {
            let mut event = Event::timeout(armed_version);
            event.timestamp_us = self.clock.epoch_us();

            let dispatcher = self.live.lock().get(&id).map(|cell| cell.dispatcher.clone());
            match dispatcher {
                Some(dispatcher) => {
                    if self.enqueue(&dispatcher, event).await.is_err() {
                        warn!(machine = %id, "timeout delivery failed");
                    }
                }
                None => debug!(machine = %id, "timer fired for absent machine, dropped"),
            }
        }
    }

    /// Recover archivals lost between "mark complete" and "archive
    /// committed": every completed active row goes back on the queue.
    pub(crate) async fn startup_scan(self: &Arc<Self>) -> Result<(), EngineError> {
        let rows = self.store.list().await?;
        for record in rows {
            if !record.complete {
                continue;
            }
            info!(machine = %record.machine_id, "startup scan re-queuing completed row");
            self.archiving.lock().insert(record.machine_id.clone());
            let tx = self.archive_tx.lock().clone();
            if let Some(tx) = tx {
                self.archive_backlog.fetch_add(1, Ordering::SeqCst);
                let job = ArchiveJob {
                    archived_at_us: self.clock.epoch_us(),
                    record,
                };
                if tx.send(job).await.is_err() {
                    self.archive_done();
                    return Err(EngineError::ShuttingDown(self.namespace.clone()));
                }
            }
        }
        Ok(())
    }

    /// Raise the fatal signal and start an orderly shutdown.
    pub(crate) fn escalate_fatal(self: &Arc<Self>, reason: &str) {
        error!(registry = %self.namespace, reason, "fatal failure, shutting down");
        self.fatal.trigger();
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.initiate_shutdown().await;
        });
    }

    /// Stop intake, drain in-flight events, persist live machines, and
    /// wait out the archival backlog, all within the grace period.
    pub(crate) async fn initiate_shutdown(self: &Arc<Self>) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus
            .publish(Notice::shutdown_started(self.clock.epoch_us()));
        info!(registry = %self.namespace, "shutdown started");

        let grace = self.config.grace_period();
        let _ = tokio::time::timeout(grace, self.wait_idle()).await;

        let cells: Vec<(MachineId, MachineCell)> = self.live.lock().drain().collect();
        let now = self.clock.epoch_us();
        for (id, cell) in cells {
            let context = {
                let mut m = cell.machine.lock();
                if !m.status().accepts_events() {
                    continue;
                }
                m.set_status(MachineStatus::Suspended);
                m.context().clone()
            };
            match codec::record_from_context(&context, now, now) {
                Ok(record) => {
                    if let Err(e) = self.store.save(record).await {
                        error!(machine = %id, error = %e, "shutdown persist failed");
                    }
                }
                Err(e) => error!(machine = %id, error = %e, "shutdown persist failed"),
            }
            self.scheduler.lock().cancel(&id);
        }

        let _ = tokio::time::timeout(grace, self.wait_archive_idle()).await;
        // Closing the queue lets the archival workers exit
        self.archive_tx.lock().take();
        info!(registry = %self.namespace, "shutdown complete");
    }
}

/// Drives the scheduler at [`TIMER_GRANULARITY`] until shutdown.
async fn run_timer_driver<P, H, C>(inner: Arc<Inner<P, H, C>>)
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    loop {
        if inner.is_shutting_down() {
            return;
        }
        tokio::time::sleep(TIMER_GRANULARITY).await;
        inner.poll_timers().await;
    }
}

/// Process-wide singleton per machine-type namespace.
pub struct Registry<P, H, C>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    inner: Arc<Inner<P, H, C>>,
}

impl<P, H, C> Clone for Registry<P, H, C>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, H, C> Registry<P, H, C>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    /// Build a registry and start its background tasks (timer driver,
    /// archival workers, retention job). When history is enabled the
    /// startup scan runs before any traffic is accepted; its failure is
    /// fatal.
    pub async fn start(
        definition: MachineDefinition,
        store: P,
        history: H,
        config: RuntimeConfig,
        clock: C,
    ) -> Result<Self, EngineError> {
        let bus = ObserverBus::new(
            config.observer.sample_one_in_n,
            config.observer.debug_log_all,
        );

        let (archive_tx, archive_rx) = if config.history.enabled {
            let (tx, rx) = mpsc::channel(ARCHIVE_QUEUE_CAP);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let inner = Arc::new(Inner {
            namespace: definition.name.clone(),
            definition: Arc::new(definition),
            store: Arc::new(store),
            history: Arc::new(history),
            bus,
            config,
            clock,
            live: Mutex::new(HashMap::new()),
            archiving: Mutex::new(HashSet::new()),
            rehydration_locks: Mutex::new(HashMap::new()),
            offline_debug: Mutex::new(OfflineDebugCache::new()),
            scheduler: Mutex::new(TimeoutScheduler::new()),
            pending: AtomicUsize::new(0),
            pending_idle: Notify::new(),
            archive_tx: Mutex::new(archive_tx),
            archive_backlog: AtomicUsize::new(0),
            archive_idle: Notify::new(),
            fatal: FatalSignal::default(),
            shutting_down: AtomicBool::new(false),
        });

        if let Some(rx) = archive_rx {
            let rx = Arc::new(tokio::sync::Mutex::new(rx));
            let workers = inner.config.history.worker_count.max(1);
            for worker in 0..workers {
                tokio::spawn(archive::run_worker(
                    Arc::clone(&inner),
                    Arc::clone(&rx),
                    worker,
                ));
            }
            tokio::spawn(retention::run(Arc::clone(&inner)));
        }
        tokio::spawn(run_timer_driver(Arc::clone(&inner)));

        let registry = Self { inner };
        if registry.inner.config.history.enabled {
            if let Err(e) = registry.inner.startup_scan().await {
                registry
                    .inner
                    .escalate_fatal(&format!("startup scan failed: {e}"));
                return Err(e);
            }
        }
        Ok(registry)
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn definition(&self) -> &Arc<MachineDefinition> {
        &self.inner.definition
    }

    /// Route an event to a machine, creating it through `factory` or
    /// rehydrating it from the store when it is not live.
    pub async fn route_event(
        &self,
        id: &MachineId,
        event: Event,
        factory: Option<&dyn ContextFactory>,
    ) -> Result<(), EngineError> {
        self.inner.route_event(id, event, factory).await
    }

    /// Add a pre-built machine to the live map. Errors on duplicate ids.
    pub fn register(&self, instance: MachineInstance) -> Result<(), EngineError> {
        if self.inner.is_shutting_down() {
            return Err(EngineError::ShuttingDown(self.inner.namespace.clone()));
        }
        self.inner
            .register_cell(Arc::new(Mutex::new(instance)), false)
    }

    /// Persist and evict a live machine. Idempotent: evicting an absent
    /// machine is a no-op.
    pub async fn evict(&self, id: &MachineId) -> Result<(), EngineError> {
        let machine = self
            .inner
            .live
            .lock()
            .get(id)
            .map(|cell| Arc::clone(&cell.machine));
        if let Some(machine) = machine {
            self.inner.persist_and_evict(id, &machine).await;
        }
        Ok(())
    }

    /// Wait until every routed event has been processed and the archival
    /// backlog is empty.
    pub async fn drain(&self) {
        self.inner.wait_idle().await;
        self.inner.wait_archive_idle().await;
    }

    /// Collect due timers and deliver them. The background driver does
    /// this continuously; tests with a fake clock call it directly.
    pub async fn poll_timers(&self) {
        self.inner.poll_timers().await;
    }

    /// Graceful shutdown: stop intake, drain, persist, wait for archival.
    pub async fn shutdown(&self) {
        self.inner.initiate_shutdown().await;
    }

    pub fn subscribe<O: Observer>(&self, observer: O, buffer: usize) -> SubscriberHandle {
        self.inner.bus.subscribe(observer, buffer)
    }

    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        self.inner.bus.unsubscribe(handle);
        if self.inner.bus.subscriber_count() == 0 {
            self.inner.clear_offline_debug();
        }
    }

    /// Recently evicted context, retained while observers are connected.
    pub fn offline_debug(&self, id: &MachineId) -> Option<MachineContext> {
        self.inner.offline_debug(id)
    }

    pub fn is_live(&self, id: &MachineId) -> bool {
        self.inner.live.lock().contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Status of a live machine, if present.
    pub fn machine_status(&self, id: &MachineId) -> Option<MachineStatus> {
        self.inner
            .live
            .lock()
            .get(id)
            .map(|cell| cell.machine.lock().status())
    }

    pub fn fatal_signal(&self) -> FatalSignal {
        self.inner.fatal.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.is_shutting_down()
    }

    /// Prune archived history older than the retention window once.
    pub async fn run_retention_once(&self) -> Result<usize, EngineError> {
        retention::run_once(&self.inner).await
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
