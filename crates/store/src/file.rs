// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable file-backed persistence: one JSON document per machine id.
//!
//! Writes go to a `.tmp` sibling, are fsynced, renamed into place, and the
//! directory is fsynced so the rename survives a crash. A row that no longer
//! parses surfaces as a fatal error rather than being dropped: this store is
//! the system of record for suspended machines.

use crate::provider::{MachineRecord, PersistenceProvider, StoreError};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use xbar_core::MachineId;

/// One durable JSON document per machine id.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn row_path(&self, id: &MachineId) -> Result<PathBuf, StoreError> {
        // Ids become file names; separators would escape the store root
        if id.as_str().is_empty() || id.as_str().contains(['/', '\\']) {
            return Err(StoreError::fatal(format!("invalid machine id: {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

/// Write `bytes` to `path` atomically: tmp file, fsync, rename, dir fsync.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

pub(crate) fn read_row(path: &Path) -> Result<Option<MachineRecord>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let record = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::fatal(format!("corrupt row at {}: {e}", path.display())))?;
    Ok(Some(record))
}

#[async_trait]
impl PersistenceProvider for FileStore {
    async fn save(&self, mut record: MachineRecord) -> Result<(), StoreError> {
        let path = self.row_path(&record.machine_id)?;
        if let Some(existing) = read_row(&path)? {
            record.created_at_us = existing.created_at_us;
        }
        write_atomic(&path, &serde_json::to_vec(&record)?)
    }

    async fn load(&self, id: &MachineId) -> Result<Option<MachineRecord>, StoreError> {
        read_row(&self.row_path(id)?)
    }

    async fn delete(&self, id: &MachineId) -> Result<(), StoreError> {
        match fs::remove_file(self.row_path(id)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &MachineId) -> Result<bool, StoreError> {
        Ok(self.row_path(id)?.exists())
    }

    async fn list(&self) -> Result<Vec<MachineRecord>, StoreError> {
        let mut rows = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(record) = read_row(&path)? {
                    rows.push(record);
                }
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
