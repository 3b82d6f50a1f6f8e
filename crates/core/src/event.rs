// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer-facing event envelope.
//!
//! Transition tables are keyed by the `type` string; payloads are opaque to
//! the runtime. Synthetic timeout events use the reserved `sys:timeout` type
//! and carry the version at which the timer was armed, so the kernel can
//! drop stale racers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved type name for synthetic timeout events.
pub const TIMEOUT_EVENT_TYPE: &str = "sys:timeout";

/// An event routed to one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Type discriminator used for transition lookup.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque domain payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Wall-clock microseconds. Zero until stamped by the registry at enqueue.
    #[serde(default)]
    pub timestamp_us: u64,
    /// Correlates related events across machines (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Event {
    /// Create an event with a payload.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp_us: 0,
            correlation_id: None,
        }
    }

    /// Create a payload-less event.
    pub fn of(event_type: impl Into<String>) -> Self {
        Self::new(event_type, Value::Null)
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Create a synthetic timeout event tagged with the arming version.
    pub fn timeout(armed_version: u64) -> Self {
        Self::new(
            TIMEOUT_EVENT_TYPE,
            serde_json::json!({ "armed_version": armed_version }),
        )
    }

    /// Returns true if this is a synthetic timeout event.
    pub fn is_timeout(&self) -> bool {
        self.event_type == TIMEOUT_EVENT_TYPE
    }

    /// The arming version carried by a synthetic timeout event.
    pub fn armed_version(&self) -> Option<u64> {
        self.payload.get("armed_version").and_then(Value::as_u64)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
