// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON codec between machine contexts and the opaque blobs stores carry.

use crate::provider::{MachineRecord, StoreError};
use xbar_core::MachineContext;

/// Serialize a context into an opaque blob.
pub fn to_blob(context: &MachineContext) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(context)?)
}

/// Deserialize a context from an opaque blob.
pub fn from_blob(blob: &[u8]) -> Result<MachineContext, StoreError> {
    Ok(serde_json::from_slice(blob)?)
}

/// Build a store row from a context.
pub fn record_from_context(
    context: &MachineContext,
    created_at_us: u64,
    updated_at_us: u64,
) -> Result<MachineRecord, StoreError> {
    Ok(MachineRecord {
        machine_id: context.id.clone(),
        context_blob: to_blob(context)?,
        current_state: context.current_state.clone(),
        last_state_change_us: context.last_state_change_us,
        complete: context.complete,
        created_at_us,
        updated_at_us,
    })
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
