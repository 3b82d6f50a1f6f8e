// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fault-injecting stores for testing retry and escalation paths
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::history::{HistoryRecord, HistoryStore};
use crate::memory::MemoryStore;
use crate::provider::{MachineRecord, PersistenceProvider, StoreError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use xbar_core::MachineId;

/// Memory store that fails the first N save attempts with a transient error.
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryStore,
    failures_left: Arc<AtomicU32>,
    save_attempts: Arc<AtomicU32>,
}

impl FlakyStore {
    /// Fail the first `failures` saves, then behave normally.
    pub fn failing_saves(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: Arc::new(AtomicU32::new(failures)),
            save_attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Total save attempts observed, including failed ones.
    pub fn save_attempts(&self) -> u32 {
        self.save_attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl PersistenceProvider for FlakyStore {
    async fn save(&self, record: MachineRecord) -> Result<(), StoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::transient("injected save failure"));
        }
        self.inner.save(record).await
    }

    async fn load(&self, id: &MachineId) -> Result<Option<MachineRecord>, StoreError> {
        self.inner.load(id).await
    }

    async fn delete(&self, id: &MachineId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn exists(&self, id: &MachineId) -> Result<bool, StoreError> {
        self.inner.exists(id).await
    }

    async fn list(&self) -> Result<Vec<MachineRecord>, StoreError> {
        self.inner.list().await
    }
}

/// History store whose inserts always fail with a transient error.
#[derive(Clone, Default)]
pub struct FailingHistoryStore {
    insert_attempts: Arc<AtomicU32>,
}

impl FailingHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn insert(&self, _record: HistoryRecord) -> Result<(), StoreError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::transient("injected history failure"))
    }

    async fn load(&self, _id: &MachineId) -> Result<Option<HistoryRecord>, StoreError> {
        Ok(None)
    }

    async fn prune_before(&self, _cutoff_us: u64) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
