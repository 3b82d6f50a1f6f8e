// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder pattern implementation for machine definitions.
//!
//! ```
//! use std::time::Duration;
//! use xbar_core::MachineDefinition;
//!
//! let def = MachineDefinition::builder("call")
//!     .initial("IDLE")
//!     .state("IDLE", |s| s.on("call:incoming", "RINGING"))
//!     .state("RINGING", |s| {
//!         s.on("call:answer", "CONNECTED")
//!             .on("call:hangup", "HUNGUP")
//!             .timeout(Duration::from_secs(30), "IDLE")
//!     })
//!     .state("CONNECTED", |s| s.on("call:hangup", "HUNGUP"))
//!     .state("HUNGUP", |s| s.terminal())
//!     .build()
//!     .unwrap();
//! assert_eq!(def.initial_state, "IDLE");
//! ```

use crate::definition::{MachineDefinition, StateConfig, TimeoutSpec};
use crate::error::{ActionError, DefinitionError};
use crate::event::Event;
use crate::MachineContext;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;

/// Fluent builder for one state.
pub struct StateBuilder {
    config: StateConfig,
}

impl StateBuilder {
    fn new(name: &str) -> Self {
        Self {
            config: StateConfig::new(name),
        }
    }

    /// Run an action when the state is entered through a transition.
    pub fn entry<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut MachineContext, &Event) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.config.entry = Some(Arc::new(action));
        self
    }

    /// Run an action when the state is left through a transition.
    pub fn exit<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut MachineContext, &Event) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.config.exit = Some(Arc::new(action));
        self
    }

    /// Transition to `target` when an event of `event_type` arrives.
    pub fn on(mut self, event_type: impl Into<String>, target: impl Into<String>) -> Self {
        self.config
            .transitions
            .insert(event_type.into(), target.into());
        self
    }

    /// Handle an event without changing state (context-only mutation).
    pub fn on_stay<F>(mut self, event_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut MachineContext, &Event) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.config
            .stay_handlers
            .insert(event_type.into(), Arc::new(handler));
        self
    }

    /// Time out into `target` after `duration` in this state.
    pub fn timeout(mut self, duration: Duration, target: impl Into<String>) -> Self {
        self.config.timeout = Some(TimeoutSpec {
            duration,
            target_state: target.into(),
        });
        self
    }

    /// Mark the state offline: entering it persists and evicts the machine.
    pub fn offline(mut self) -> Self {
        self.config.offline = true;
        self
    }

    /// Mark the state final: entering it completes the machine and queues
    /// it for history archival.
    pub fn terminal(mut self) -> Self {
        self.config.terminal = true;
        self
    }

    /// Re-arm the state's timeout whenever a stay-event is handled.
    pub fn reset_timeout_on_stay(mut self) -> Self {
        self.config.reset_timeout_on_stay = true;
        self
    }
}

/// Fluent builder for a machine definition.
pub struct DefinitionBuilder {
    name: String,
    initial: Option<String>,
    states: IndexMap<String, StateConfig>,
    duplicate: Option<String>,
}

impl DefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: None,
            states: IndexMap::new(),
            duplicate: None,
        }
    }

    /// Set the initial state. Defaults to the first declared state.
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Declare a state.
    pub fn state<F>(mut self, name: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(StateBuilder) -> StateBuilder,
    {
        let name = name.into();
        let builder = configure(StateBuilder::new(&name));
        if self.states.insert(name.clone(), builder.config).is_some() {
            self.duplicate.get_or_insert(name);
        }
        self
    }

    /// Validate and build the definition.
    pub fn build(self) -> Result<MachineDefinition, DefinitionError> {
        if let Some(name) = self.duplicate {
            return Err(DefinitionError::DuplicateState(name));
        }
        if self.states.is_empty() {
            return Err(DefinitionError::Empty(self.name));
        }

        let initial_state = match self.initial {
            Some(name) => name,
            // IndexMap preserves declaration order
            None => match self.states.keys().next() {
                Some(first) => first.clone(),
                None => return Err(DefinitionError::NoInitialState(self.name)),
            },
        };
        if !self.states.contains_key(&initial_state) {
            return Err(DefinitionError::UnknownInitialState(initial_state));
        }

        for state in self.states.values() {
            for (event, target) in &state.transitions {
                if state.stay_handlers.contains_key(event) {
                    return Err(DefinitionError::ConflictingHandlers {
                        state: state.name.clone(),
                        event: event.clone(),
                    });
                }
                if !self.states.contains_key(target) {
                    return Err(DefinitionError::UnknownTransitionTarget {
                        state: state.name.clone(),
                        event: event.clone(),
                        target: target.clone(),
                    });
                }
            }
            if let Some(timeout) = &state.timeout {
                if !self.states.contains_key(&timeout.target_state) {
                    return Err(DefinitionError::UnknownTimeoutTarget {
                        state: state.name.clone(),
                        target: timeout.target_state.clone(),
                    });
                }
            }
            if state.terminal && !state.transitions.is_empty() {
                return Err(DefinitionError::FinalStateWithTransitions(
                    state.name.clone(),
                ));
            }
        }

        Ok(MachineDefinition {
            name: self.name,
            initial_state,
            states: self.states,
        })
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
