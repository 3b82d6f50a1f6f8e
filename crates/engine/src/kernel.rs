// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The FSM kernel: one machine instance and its `fire` loop.
//!
//! `fire` is the only mutator of state, version, and last-state-change.
//! It performs no I/O; everything the runtime must do on its behalf (arm
//! or cancel timers, publish snapshots, persist, archive) comes back as
//! [`Effect`]s that the owning dispatcher executes. The registry's per-id
//! serialization makes each instance single-threaded, so there are no
//! locks in here.

use crate::error::EngineError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use xbar_core::{
    encode_context, Clock, Event, MachineContext, MachineDefinition, MachineId, MachineStatus,
    RunId, StateConfig, TransitionKind, TransitionSnapshot,
};
use xbar_observe::Notice;

/// Event type recorded on activation of a fresh machine.
const START_EVENT_TYPE: &str = "sys:start";

/// Event type recorded on rehydration snapshots.
const REHYDRATE_EVENT_TYPE: &str = "sys:rehydrate";

/// Side effects the dispatcher must execute after a fire.
#[derive(Debug)]
pub enum Effect {
    /// Arm the machine's timer for `duration`, tagged with `version`.
    ArmTimeout { duration: Duration, version: u64 },
    /// Cancel the machine's timer.
    CancelTimeout,
    /// Publish a notice on the observer bus.
    Publish(Notice),
    /// The machine entered an offline state: persist it, then evict.
    PersistAndEvict,
    /// The machine entered a final state: hand it to the archiver.
    Archive,
}

/// How the kernel disposed of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Transitioned { from: String, to: String },
    /// A stay-event mutated the context without changing state.
    Stayed,
    /// No handler for the event in the current state; nothing mutated.
    Ignored,
    /// A timeout whose arming version no longer matches; dropped.
    StaleTimeout,
}

/// Result of one fire.
#[derive(Debug)]
pub struct FireResult {
    pub outcome: FireOutcome,
    pub effects: Vec<Effect>,
}

/// Timeout disposition computed on rehydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutResume {
    /// The restored state has no timeout.
    None,
    /// The timeout elapsed while evicted; fire a synthetic timeout now.
    Expired { armed_version: u64 },
    /// Schedule a timer for the remaining duration.
    Remaining {
        duration: Duration,
        armed_version: u64,
    },
}

/// One live machine.
#[derive(Debug)]
pub struct MachineInstance {
    definition: Arc<MachineDefinition>,
    context: MachineContext,
    /// Transient scratch space; never persisted, never restored.
    volatile: Value,
    version: u64,
    run_id: RunId,
    status: MachineStatus,
    /// Version tag of the armed timer for the current state, if any.
    armed_version: Option<u64>,
}

impl MachineInstance {
    /// Build a fresh machine in CREATED status.
    ///
    /// The context's state must name a state of the definition; its id is
    /// the machine id.
    pub fn new(
        definition: Arc<MachineDefinition>,
        context: MachineContext,
    ) -> Result<Self, EngineError> {
        Self::check_state(&definition, &context)?;
        Ok(Self {
            definition,
            context,
            volatile: Value::Null,
            version: 0,
            run_id: RunId::generate(),
            status: MachineStatus::Created,
            armed_version: None,
        })
    }

    /// Restore a machine from a persisted context.
    ///
    /// The restored state's entry action is NOT run: its side effects
    /// happened when the state was first entered. A fresh run id marks the
    /// new activation; the version restarts at zero.
    pub fn restore(
        definition: Arc<MachineDefinition>,
        context: MachineContext,
    ) -> Result<Self, EngineError> {
        if context.complete {
            return Err(EngineError::Completed(context.id));
        }
        Self::check_state(&definition, &context)?;
        Ok(Self {
            definition,
            context,
            volatile: Value::Null,
            version: 0,
            run_id: RunId::generate(),
            status: MachineStatus::Running,
            armed_version: None,
        })
    }

    fn check_state(
        definition: &MachineDefinition,
        context: &MachineContext,
    ) -> Result<(), EngineError> {
        if definition.state(&context.current_state).is_none() {
            return Err(EngineError::UndefinedState {
                id: context.id.clone(),
                state: context.current_state.clone(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> &MachineId {
        &self.context.id
    }

    pub fn context(&self) -> &MachineContext {
        &self.context
    }

    pub fn current_state(&self) -> &str {
        &self.context.current_state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: MachineStatus) {
        self.status = status;
    }

    pub fn volatile(&self) -> &Value {
        &self.volatile
    }

    pub fn volatile_mut(&mut self) -> &mut Value {
        &mut self.volatile
    }

    /// Explicitly activate a CREATED machine: run the initial state's entry
    /// action and arm its timeout. No-op for machines already RUNNING.
    pub fn start(&mut self, clock: &impl Clock) -> Result<Vec<Effect>, EngineError> {
        match self.status {
            MachineStatus::Created => {}
            MachineStatus::Running => return Ok(Vec::new()),
            status => {
                return Err(EngineError::Stopped {
                    id: self.context.id.clone(),
                    status,
                })
            }
        }
        let mut effects = Vec::new();
        let start_event = Event::of(START_EVENT_TYPE);
        if let Some(error) = self.activate(&start_event, &mut effects) {
            let snapshot = self.build_snapshot(
                TransitionKind::Stay,
                Some(self.context.current_state.clone()),
                &start_event,
                None,
                clock,
                Some(error),
            )?;
            effects.push(Effect::Publish(Notice::Transition(Box::new(snapshot))));
        }
        Ok(effects)
    }

    /// Transition CREATED -> RUNNING: run the initial entry action and arm
    /// the initial state's timeout. Returns an error marker if the entry
    /// action failed.
    fn activate(&mut self, event: &Event, effects: &mut Vec<Effect>) -> Option<String> {
        let definition = Arc::clone(&self.definition);
        self.status = MachineStatus::Running;
        let state = definition.state(&self.context.current_state)?;

        let mut error = None;
        if let Some(entry) = &state.entry {
            if let Err(e) = entry(&mut self.context, event) {
                error = Some(e.to_string());
            }
        }
        if !state.terminal {
            if let Some(spec) = &state.timeout {
                effects.push(Effect::ArmTimeout {
                    duration: spec.duration,
                    version: self.version,
                });
                self.armed_version = Some(self.version);
            }
        }
        error
    }

    /// Deliver one event.
    ///
    /// Exceptions from user actions never roll the transition back: the
    /// exit action's side effects may already be observable, so the state
    /// swap is committed and the error is carried on the snapshot.
    pub fn fire(
        &mut self,
        event: &Event,
        clock: &impl Clock,
        include_context_before: bool,
    ) -> Result<FireResult, EngineError> {
        if !self.status.accepts_events() {
            if matches!(
                self.status,
                MachineStatus::Archiving | MachineStatus::Archived
            ) {
                return Err(EngineError::FinalState {
                    id: self.context.id.clone(),
                    state: self.context.current_state.clone(),
                });
            }
            return Err(EngineError::Stopped {
                id: self.context.id.clone(),
                status: self.status,
            });
        }

        let definition = Arc::clone(&self.definition);
        let mut effects = Vec::new();
        let mut activation_error = None;
        if self.status == MachineStatus::Created {
            activation_error = self.activate(event, &mut effects);
        }

        let state = definition
            .state(&self.context.current_state)
            .ok_or_else(|| EngineError::UndefinedState {
                id: self.context.id.clone(),
                state: self.context.current_state.clone(),
            })?;

        if state.terminal {
            return Err(EngineError::FinalState {
                id: self.context.id.clone(),
                state: state.name.clone(),
            });
        }

        if event.is_timeout() {
            return self.fire_timeout(&definition, state, event, clock, include_context_before, effects);
        }

        if let Some(target) = state.transition_target(&event.event_type) {
            let target = target.to_string();
            return self.transition(
                &definition,
                state,
                &target,
                event,
                clock,
                include_context_before,
                effects,
                activation_error,
            );
        }

        if let Some(handler) = state.stay_handlers.get(&event.event_type) {
            return self.stay(
                state,
                Arc::clone(handler),
                event,
                clock,
                include_context_before,
                effects,
                activation_error,
            );
        }

        // Unhandled: record an ignored snapshot, mutate nothing
        let snapshot = self.build_snapshot(
            TransitionKind::Ignored,
            Some(self.context.current_state.clone()),
            event,
            None,
            clock,
            activation_error,
        )?;
        effects.push(Effect::Publish(Notice::Transition(Box::new(snapshot))));
        Ok(FireResult {
            outcome: FireOutcome::Ignored,
            effects,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn fire_timeout(
        &mut self,
        definition: &Arc<MachineDefinition>,
        state: &StateConfig,
        event: &Event,
        clock: &impl Clock,
        include_context_before: bool,
        effects: Vec<Effect>,
    ) -> Result<FireResult, EngineError> {
        let armed = self.armed_version;
        match (&state.timeout, event.armed_version()) {
            (Some(spec), Some(version)) if armed == Some(version) => {
                let target = spec.target_state.clone();
                self.transition(
                    definition,
                    state,
                    &target,
                    event,
                    clock,
                    include_context_before,
                    effects,
                    None,
                )
            }
            _ => {
                debug!(
                    machine = %self.context.id,
                    state = %state.name,
                    tagged = ?event.armed_version(),
                    armed = ?armed,
                    "stale timeout dropped"
                );
                Ok(FireResult {
                    outcome: FireOutcome::StaleTimeout,
                    effects,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transition(
        &mut self,
        definition: &Arc<MachineDefinition>,
        from: &StateConfig,
        target: &str,
        event: &Event,
        clock: &impl Clock,
        include_context_before: bool,
        mut effects: Vec<Effect>,
        mut error: Option<String>,
    ) -> Result<FireResult, EngineError> {
        let started = clock.now();
        let from_name = from.name.clone();
        let context_before = if include_context_before {
            Some(self.encode(&self.context)?)
        } else {
            None
        };

        if let Some(exit) = &from.exit {
            if let Err(e) = exit(&mut self.context, event) {
                append_error(&mut error, &e.to_string());
            }
        }

        let to = definition
            .state(target)
            .ok_or_else(|| EngineError::UndefinedState {
                id: self.context.id.clone(),
                state: target.to_string(),
            })?;

        self.context.mark_state(to.name.as_str(), clock.epoch_us());
        self.version += 1;
        if to.terminal {
            self.context.complete = true;
        }

        if let Some(entry) = &to.entry {
            if let Err(e) = entry(&mut self.context, event) {
                append_error(&mut error, &e.to_string());
            }
        }

        // Any pending timer belongs to the previous state
        effects.push(Effect::CancelTimeout);
        self.armed_version = None;
        if !to.terminal {
            if let Some(spec) = &to.timeout {
                effects.push(Effect::ArmTimeout {
                    duration: spec.duration,
                    version: self.version,
                });
                self.armed_version = Some(self.version);
            }
        }

        if to.terminal {
            self.status = MachineStatus::Archiving;
        }

        let mut snapshot = self.build_snapshot(
            TransitionKind::Changed,
            Some(from_name.clone()),
            event,
            context_before,
            clock,
            error,
        )?;
        snapshot.transition_nanos = (clock.now() - started).as_nanos() as u64;
        effects.push(Effect::Publish(Notice::Transition(Box::new(snapshot))));

        if to.terminal {
            effects.push(Effect::Archive);
        } else if to.offline {
            effects.push(Effect::PersistAndEvict);
        }

        Ok(FireResult {
            outcome: FireOutcome::Transitioned {
                from: from_name,
                to: to.name.clone(),
            },
            effects,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn stay(
        &mut self,
        state: &StateConfig,
        handler: xbar_core::ActionFn,
        event: &Event,
        clock: &impl Clock,
        include_context_before: bool,
        mut effects: Vec<Effect>,
        mut error: Option<String>,
    ) -> Result<FireResult, EngineError> {
        let started = clock.now();
        let context_before = if include_context_before {
            Some(self.encode(&self.context)?)
        } else {
            None
        };

        if let Err(e) = handler(&mut self.context, event) {
            append_error(&mut error, &e.to_string());
        }
        self.version += 1;

        if state.reset_timeout_on_stay {
            if let Some(spec) = &state.timeout {
                effects.push(Effect::CancelTimeout);
                effects.push(Effect::ArmTimeout {
                    duration: spec.duration,
                    version: self.version,
                });
                self.armed_version = Some(self.version);
            }
        }

        let mut snapshot = self.build_snapshot(
            TransitionKind::Stay,
            Some(state.name.clone()),
            event,
            context_before,
            clock,
            error,
        )?;
        snapshot.transition_nanos = (clock.now() - started).as_nanos() as u64;
        effects.push(Effect::Publish(Notice::Transition(Box::new(snapshot))));

        Ok(FireResult {
            outcome: FireOutcome::Stayed,
            effects,
        })
    }

    /// Timeout disposition after rehydration, given the time spent evicted.
    ///
    /// Arms the version tag so a subsequent synthetic timeout (or the
    /// scheduled timer's firing) passes the stale check.
    pub fn resume_timeout(&mut self, elapsed: Duration) -> TimeoutResume {
        let spec = match self
            .definition
            .state(&self.context.current_state)
            .and_then(|s| s.timeout.as_ref())
        {
            Some(spec) => spec,
            None => return TimeoutResume::None,
        };
        self.armed_version = Some(self.version);
        if elapsed >= spec.duration {
            TimeoutResume::Expired {
                armed_version: self.version,
            }
        } else {
            TimeoutResume::Remaining {
                duration: spec.duration - elapsed,
                armed_version: self.version,
            }
        }
    }

    /// Snapshot recording a completed rehydration (`state_before` is null).
    pub fn rehydration_snapshot(
        &self,
        clock: &impl Clock,
    ) -> Result<TransitionSnapshot, EngineError> {
        let event = Event::of(REHYDRATE_EVENT_TYPE);
        self.build_snapshot(TransitionKind::Rehydrated, None, &event, None, clock, None)
    }

    fn encode(&self, context: &MachineContext) -> Result<String, EngineError> {
        encode_context(context).map_err(|e| EngineError::Serialize(e.to_string()))
    }

    fn build_snapshot(
        &self,
        kind: TransitionKind,
        state_before: Option<String>,
        event: &Event,
        context_before: Option<String>,
        clock: &impl Clock,
        error: Option<String>,
    ) -> Result<TransitionSnapshot, EngineError> {
        let state = self.definition.state(&self.context.current_state);
        let state_offline = state.map(|s| s.offline).unwrap_or(false);
        let terminal = state.map(|s| s.terminal).unwrap_or(false);
        Ok(TransitionSnapshot {
            machine_id: self.context.id.clone(),
            version: self.version,
            run_id: self.run_id.clone(),
            kind,
            state_before,
            state_after: self.context.current_state.clone(),
            event_type: event.event_type.clone(),
            event_payload: event.payload.clone(),
            context_before,
            context_after: self.encode(&self.context)?,
            transition_nanos: 0,
            timestamp_us: clock.epoch_us(),
            machine_online: !state_offline && !terminal,
            state_offline,
            registry_status: self.status,
            error,
        })
    }
}

/// Record a failed user action. The transition is committed regardless;
/// the message lands on the snapshot's error marker.
fn append_error(slot: &mut Option<String>, message: &str) {
    warn!(error = message, "user action failed; transition committed");
    match slot {
        Some(existing) => {
            existing.push_str("; ");
            existing.push_str(message);
        }
        None => *slot = Some(message.to_string()),
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
