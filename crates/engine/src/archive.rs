// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History archival workers.
//!
//! Completed machines are moved from the active store into the history
//! store by a small worker pool. The move is insert-then-delete: a crash
//! between the two leaves the row in both stores, which the startup scan
//! resolves by re-queuing the completed active row (history inserts are
//! idempotent upserts). A job that still fails after the retry budget is
//! an irrecoverable loss, so it takes the registry down: a dead process
//! beats silent data loss.

use crate::registry::Inner;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use xbar_core::Clock;
use xbar_observe::{LifecycleKind, Notice};
use xbar_store::{HistoryRecord, HistoryStore, MachineRecord, PersistenceProvider, StoreError};

/// One machine to move into history.
pub(crate) struct ArchiveJob {
    pub(crate) record: MachineRecord,
    pub(crate) archived_at_us: u64,
}

/// Attempts per job before fatal escalation.
const ARCHIVE_ATTEMPTS: u32 = 3;

/// Worker loop: pull jobs until the queue closes at shutdown.
pub(crate) async fn run_worker<P, H, C>(
    inner: Arc<Inner<P, H, C>>,
    rx: Arc<Mutex<mpsc::Receiver<ArchiveJob>>>,
    worker: usize,
) where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { return };
        archive_one(&inner, job, worker).await;
        inner.archive_done();
    }
}

async fn archive_one<P, H, C>(inner: &Arc<Inner<P, H, C>>, job: ArchiveJob, worker: usize)
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    let id = job.record.machine_id.clone();
    let mut delay = inner.config.history_retry_base_delay();
    let mut attempt = 1;
    loop {
        match try_archive(inner, &job).await {
            Ok(()) => {
                inner.archiving.lock().remove(&id);
                inner.bus.publish(Notice::lifecycle(
                    LifecycleKind::Archived,
                    id.clone(),
                    inner.clock.epoch_us(),
                ));
                info!(machine = %id, worker, "archived");
                return;
            }
            Err(e) => {
                warn!(machine = %id, worker, attempt, error = %e, "archival attempt failed");
                if attempt >= ARCHIVE_ATTEMPTS {
                    inner.escalate_fatal(&format!(
                        "archival failed for {id} after {attempt} attempts: {e}"
                    ));
                    return;
                }
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Insert into history, then delete the active row.
async fn try_archive<P, H, C>(
    inner: &Arc<Inner<P, H, C>>,
    job: &ArchiveJob,
) -> Result<(), StoreError>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    inner
        .history
        .insert(HistoryRecord {
            row: job.record.clone(),
            archived_at_us: job.archived_at_us,
        })
        .await?;
    inner.store.delete(&job.record.machine_id).await?;
    Ok(())
}
