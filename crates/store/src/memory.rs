// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory persistence backend for tests and development.

use crate::provider::{MachineRecord, PersistenceProvider, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use xbar_core::MachineId;

/// Non-durable store backed by a map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<HashMap<MachineId, MachineRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl PersistenceProvider for MemoryStore {
    async fn save(&self, mut record: MachineRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.get(&record.machine_id) {
            record.created_at_us = existing.created_at_us;
        }
        rows.insert(record.machine_id.clone(), record);
        Ok(())
    }

    async fn load(&self, id: &MachineId) -> Result<Option<MachineRecord>, StoreError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn delete(&self, id: &MachineId) -> Result<(), StoreError> {
        self.rows.lock().remove(id);
        Ok(())
    }

    async fn exists(&self, id: &MachineId) -> Result<bool, StoreError> {
        Ok(self.rows.lock().contains_key(id))
    }

    async fn list(&self) -> Result<Vec<MachineRecord>, StoreError> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
