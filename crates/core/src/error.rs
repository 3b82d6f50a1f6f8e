// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for definitions and user-supplied actions

use thiserror::Error;

/// Failure raised by a user-supplied entry/exit/stay action.
///
/// Action failures never roll a transition back (external side effects of
/// the exit action may already be observable); the kernel commits the
/// transition and records the error on the snapshot.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Errors raised when validating a machine definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("definition '{0}' has no states")]
    Empty(String),
    #[error("definition '{0}' has no initial state")]
    NoInitialState(String),
    #[error("initial state '{0}' is not defined")]
    UnknownInitialState(String),
    #[error("state '{0}' is defined twice")]
    DuplicateState(String),
    #[error("state '{state}' routes event '{event}' to undefined state '{target}'")]
    UnknownTransitionTarget {
        state: String,
        event: String,
        target: String,
    },
    #[error("state '{state}' times out into undefined state '{target}'")]
    UnknownTimeoutTarget { state: String, target: String },
    #[error("final state '{0}' has outgoing transitions")]
    FinalStateWithTransitions(String),
    #[error("state '{state}' handles event '{event}' both as a transition and a stay-event")]
    ConflictingHandlers { state: String, event: String },
}
