// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sharded persistence: file stores spread across N shard directories.
//!
//! A machine id always maps to the same shard (sha2 of the id modulo the
//! shard count), so the per-row contract is identical to a single file
//! store while directory fan-out stays bounded under millions of rows.

use crate::file::FileStore;
use crate::provider::{MachineRecord, PersistenceProvider, StoreError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use xbar_core::MachineId;

/// File stores sharded by machine id hash.
#[derive(Debug, Clone)]
pub struct ShardedStore {
    shards: Vec<FileStore>,
}

impl ShardedStore {
    /// Open `shard_count` file stores under `dir` (`shard-00`, `shard-01`, ...).
    pub fn open(dir: impl Into<PathBuf>, shard_count: usize) -> Result<Self, StoreError> {
        if shard_count == 0 {
            return Err(StoreError::fatal("shard count must be non-zero"));
        }
        let dir = dir.into();
        let shards = (0..shard_count)
            .map(|n| FileStore::open(dir.join(format!("shard-{n:02}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, id: &MachineId) -> &FileStore {
        let digest = Sha256::digest(id.as_str().as_bytes());
        let index = usize::from(digest[0]) % self.shards.len();
        &self.shards[index]
    }
}

#[async_trait]
impl PersistenceProvider for ShardedStore {
    async fn save(&self, record: MachineRecord) -> Result<(), StoreError> {
        self.shard_for(&record.machine_id).save(record).await
    }

    async fn load(&self, id: &MachineId) -> Result<Option<MachineRecord>, StoreError> {
        self.shard_for(id).load(id).await
    }

    async fn delete(&self, id: &MachineId) -> Result<(), StoreError> {
        self.shard_for(id).delete(id).await
    }

    async fn exists(&self, id: &MachineId) -> Result<bool, StoreError> {
        self.shard_for(id).exists(id).await
    }

    async fn list(&self) -> Result<Vec<MachineRecord>, StoreError> {
        let mut rows = Vec::new();
        for shard in &self.shards {
            rows.extend(shard.list().await?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "shard_tests.rs"]
mod tests;
