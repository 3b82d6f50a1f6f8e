// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent machine context and registry-visible machine status.

use crate::id::MachineId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Registry-visible status of a machine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    /// Built but never fired
    Created,
    /// Live, processing events
    Running,
    /// Entered an offline state; persisted, about to leave memory
    Suspended,
    /// Removed from the live map
    Evicted,
    /// Entered a final state; queued for history archival
    Archiving,
    /// History insert committed, active row deleted
    Archived,
}

impl MachineStatus {
    /// Statuses that accept further events.
    pub fn accepts_events(&self) -> bool {
        matches!(self, MachineStatus::Created | MachineStatus::Running)
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineStatus::Created => "created",
            MachineStatus::Running => "running",
            MachineStatus::Suspended => "suspended",
            MachineStatus::Evicted => "evicted",
            MachineStatus::Archiving => "archiving",
            MachineStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

/// The durable half of a machine: everything that survives eviction.
///
/// The domain payload is an opaque JSON document; the runtime only reads and
/// writes the envelope fields. Volatile state lives on the instance and is
/// never part of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineContext {
    /// Machine id; always equal to the owning instance's id.
    pub id: MachineId,
    /// Name of the current state in the definition.
    pub current_state: String,
    /// Wall-clock microseconds of the last state-changing transition.
    pub last_state_change_us: u64,
    /// True once a final state has been entered. Complete machines are
    /// never rehydrated.
    pub complete: bool,
    /// Opaque domain payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl MachineContext {
    /// Create a context in the given initial state.
    pub fn new(id: MachineId, initial_state: impl Into<String>, now_us: u64) -> Self {
        Self {
            id,
            current_state: initial_state.into(),
            last_state_change_us: now_us,
            complete: false,
            data: Value::Null,
        }
    }

    /// Seed the domain payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Record a state-changing transition.
    pub fn mark_state(&mut self, state: impl Into<String>, now_us: u64) {
        self.current_state = state.into();
        self.last_state_change_us = now_us;
    }

    /// Read a field out of the domain payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a field into the domain payload, promoting `null` to an object.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if !self.data.is_object() {
            self.data = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.data.as_object_mut() {
            map.insert(key.into(), value);
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
