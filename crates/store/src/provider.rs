// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistence contract every backend implements.
//!
//! One row per active machine id. `save` is a durable upsert; `load` returns
//! the last successful save. Context blobs are opaque bytes — the codec that
//! produces them lives above this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xbar_core::MachineId;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Retryable: the caller may attempt the operation again.
    #[error("transient store failure: {0}")]
    Transient(String),
    /// Irrecoverable: escalates to registry shutdown.
    #[error("fatal store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Fatal(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    // A row that no longer parses is lost data, not a retry candidate
    fn from(e: serde_json::Error) -> Self {
        Self::Fatal(e.to_string())
    }
}

/// One persisted machine row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub machine_id: MachineId,
    /// Opaque serialized context, base64-wrapped on the wire.
    #[serde(with = "blob_b64")]
    pub context_blob: Vec<u8>,
    pub current_state: String,
    pub last_state_change_us: u64,
    pub complete: bool,
    pub created_at_us: u64,
    pub updated_at_us: u64,
}

/// Keyed store of active machine rows.
#[async_trait]
pub trait PersistenceProvider: Send + Sync + 'static {
    /// Durable upsert keyed by machine id. The row's `created_at_us` is
    /// preserved when a row for the id already exists.
    async fn save(&self, record: MachineRecord) -> Result<(), StoreError>;

    /// Returns the last successfully saved row, if any.
    async fn load(&self, id: &MachineId) -> Result<Option<MachineRecord>, StoreError>;

    /// Remove the row. Idempotent.
    async fn delete(&self, id: &MachineId) -> Result<(), StoreError>;

    async fn exists(&self, id: &MachineId) -> Result<bool, StoreError>;

    /// All active rows. Used by the archival startup scan.
    async fn list(&self) -> Result<Vec<MachineRecord>, StoreError>;
}

mod blob_b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BASE64.decode(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
