// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable transition records emitted to observers.
//!
//! Context payloads are JSON-serialized and base64-wrapped so observer
//! transports can treat them as opaque strings.

use crate::context::{MachineContext, MachineStatus};
use crate::id::{MachineId, RunId};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the kernel disposed of the event behind a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// State changed
    Changed,
    /// Stay-event handled; state unchanged
    Stay,
    /// Event had no handler in the current state; nothing mutated
    Ignored,
    /// Machine restored from the persistence backend
    Rehydrated,
}

/// One transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSnapshot {
    pub machine_id: MachineId,
    pub version: u64,
    pub run_id: RunId,
    pub kind: TransitionKind,
    /// `None` for rehydration records.
    pub state_before: Option<String>,
    pub state_after: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub event_payload: Value,
    /// Base64-wrapped JSON; populated only when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_before: Option<String>,
    /// Base64-wrapped JSON.
    pub context_after: String,
    pub transition_nanos: u64,
    pub timestamp_us: u64,
    /// False once the machine has entered an offline or final state.
    pub machine_online: bool,
    /// Whether `state_after` is an offline state.
    pub state_offline: bool,
    pub registry_status: MachineStatus,
    /// Message of a failed user action, if any. The transition stays
    /// committed regardless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Base64-wrap a context for opaque transport.
pub fn encode_context(context: &MachineContext) -> Result<String, serde_json::Error> {
    Ok(BASE64.encode(serde_json::to_vec(context)?))
}

/// Unwrap a base64 context payload.
pub fn decode_context(encoded: &str) -> Option<MachineContext> {
    let bytes = BASE64.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
