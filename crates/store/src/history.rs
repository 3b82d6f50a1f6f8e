// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History store for archived (completed) machines.
//!
//! Rows mirror the active schema plus `archived_at_us`. The file backend
//! partitions rows into `YYYYMMDD/` directories keyed by archive time, so
//! retention can drop whole partitions instead of scanning rows.

use crate::file::write_atomic;
use crate::provider::{MachineRecord, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use xbar_core::MachineId;

/// One archived machine row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub row: MachineRecord,
    pub archived_at_us: u64,
}

/// Keyed store of archived machine rows.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Durable upsert keyed by machine id. Re-inserting after a crashed
    /// archival replaces the earlier row.
    async fn insert(&self, record: HistoryRecord) -> Result<(), StoreError>;

    async fn load(&self, id: &MachineId) -> Result<Option<HistoryRecord>, StoreError>;

    /// Drop rows archived before the cutoff. Returns the number of rows
    /// removed. Partial failures are logged, not raised.
    async fn prune_before(&self, cutoff_us: u64) -> Result<usize, StoreError>;
}

/// Partition directory name for an archive timestamp.
fn partition_name(archived_at_us: u64) -> String {
    DateTime::<Utc>::from_timestamp_micros(archived_at_us as i64)
        .unwrap_or_default()
        .format("%Y%m%d")
        .to_string()
}

/// Day-partitioned file-backed history store.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    /// Open a history store rooted at `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn partitions(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn row_file(id: &MachineId) -> Result<String, StoreError> {
        if id.as_str().is_empty() || id.as_str().contains(['/', '\\']) {
            return Err(StoreError::fatal(format!("invalid machine id: {id:?}")));
        }
        Ok(format!("{id}.json"))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn insert(&self, record: HistoryRecord) -> Result<(), StoreError> {
        let file_name = Self::row_file(&record.row.machine_id)?;
        let partition = self.dir.join(partition_name(record.archived_at_us));
        fs::create_dir_all(&partition)?;

        // A re-archival after a crash may land on a different day; drop the
        // stale row so the id stays unique across partitions.
        for other in self.partitions()? {
            if other != partition {
                let stale = other.join(&file_name);
                if stale.exists() {
                    fs::remove_file(stale)?;
                }
            }
        }

        write_atomic(&partition.join(&file_name), &serde_json::to_vec(&record)?)
    }

    async fn load(&self, id: &MachineId) -> Result<Option<HistoryRecord>, StoreError> {
        let file_name = Self::row_file(id)?;
        for partition in self.partitions()? {
            let path = partition.join(&file_name);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let record = serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::fatal(format!("corrupt history row at {}: {e}", path.display()))
            })?;
            return Ok(Some(record));
        }
        Ok(None)
    }

    async fn prune_before(&self, cutoff_us: u64) -> Result<usize, StoreError> {
        let cutoff = partition_name(cutoff_us);
        let mut removed = 0;
        for partition in self.partitions()? {
            let name = partition
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.as_str() >= cutoff.as_str() {
                continue;
            }
            let rows = fs::read_dir(&partition).map(|dir| dir.count()).unwrap_or(0);
            match fs::remove_dir_all(&partition) {
                Ok(()) => removed += rows,
                Err(e) => {
                    warn!(partition = %partition.display(), error = %e, "history prune failed for partition");
                }
            }
        }
        Ok(removed)
    }
}

/// Non-durable history store for tests and development.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    rows: Arc<Mutex<HashMap<MachineId, HistoryRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(&self, record: HistoryRecord) -> Result<(), StoreError> {
        self.rows
            .lock()
            .insert(record.row.machine_id.clone(), record);
        Ok(())
    }

    async fn load(&self, id: &MachineId) -> Result<Option<HistoryRecord>, StoreError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn prune_before(&self, cutoff_us: u64) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, record| record.archived_at_us >= cutoff_us);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
