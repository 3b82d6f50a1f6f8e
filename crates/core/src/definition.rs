// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative machine definitions.
//!
//! A [`MachineDefinition`] is built once per machine type and shared
//! (behind an `Arc`) by every instance of that type. States are plain data
//! records carrying closures for entry/exit work, an event-type-keyed
//! transition table, and the offline/final markers that drive eviction and
//! archival.

use crate::builder::DefinitionBuilder;
use crate::context::MachineContext;
use crate::error::ActionError;
use crate::event::Event;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A user-supplied action run against the persistent context.
pub type ActionFn =
    Arc<dyn Fn(&mut MachineContext, &Event) -> Result<(), ActionError> + Send + Sync>;

/// Per-state timeout: after `duration` in the state, transition to
/// `target_state` via a synthetic timeout event.
#[derive(Clone)]
pub struct TimeoutSpec {
    pub duration: Duration,
    pub target_state: String,
}

impl fmt::Debug for TimeoutSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutSpec")
            .field("duration", &self.duration)
            .field("target_state", &self.target_state)
            .finish()
    }
}

/// Configuration of one state.
#[derive(Clone)]
pub struct StateConfig {
    pub name: String,
    /// Run when the state is entered through a transition (never on
    /// rehydration).
    pub entry: Option<ActionFn>,
    /// Run when the state is left through a transition.
    pub exit: Option<ActionFn>,
    /// Event type -> target state.
    pub transitions: IndexMap<String, String>,
    /// Event type -> context-mutating handler that does not change state.
    pub stay_handlers: IndexMap<String, ActionFn>,
    pub timeout: Option<TimeoutSpec>,
    /// Entering this state persists the machine and evicts it from memory.
    pub offline: bool,
    /// Entering this state completes the machine and queues it for history
    /// archival.
    pub terminal: bool,
    /// Whether a handled stay-event re-arms the state's timeout.
    pub reset_timeout_on_stay: bool,
}

impl StateConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            exit: None,
            transitions: IndexMap::new(),
            stay_handlers: IndexMap::new(),
            timeout: None,
            offline: false,
            terminal: false,
            reset_timeout_on_stay: false,
        }
    }

    /// Target state for the given event type, if this state transitions on it.
    pub fn transition_target(&self, event_type: &str) -> Option<&str> {
        self.transitions.get(event_type).map(String::as_str)
    }
}

impl fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateConfig")
            .field("name", &self.name)
            .field("entry", &self.entry.is_some())
            .field("exit", &self.exit.is_some())
            .field("transitions", &self.transitions)
            .field("stay_events", &self.stay_handlers.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .field("offline", &self.offline)
            .field("terminal", &self.terminal)
            .finish()
    }
}

/// Immutable definition of a machine type, shared across all instances.
#[derive(Debug, Clone)]
pub struct MachineDefinition {
    /// Machine type name (e.g. `call`), also the registry namespace.
    pub name: String,
    pub initial_state: String,
    /// States in declaration order.
    pub states: IndexMap<String, StateConfig>,
}

impl MachineDefinition {
    /// Start a fluent builder for a machine type.
    pub fn builder(name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder::new(name)
    }

    /// Look up a state by name.
    pub fn state(&self, name: &str) -> Option<&StateConfig> {
        self.states.get(name)
    }

    /// The initial state's configuration.
    pub fn initial(&self) -> Option<&StateConfig> {
        self.states.get(&self.initial_state)
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
