// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled pruning of old history rows. Failures are logged, never
//! escalated: retention is housekeeping, not correctness.

use crate::error::EngineError;
use crate::registry::Inner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use xbar_core::Clock;
use xbar_store::{HistoryStore, PersistenceProvider};

const DAY_US: u64 = 86_400_000_000;

/// Daily sweep interval.
const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) async fn run<P, H, C>(inner: Arc<Inner<P, H, C>>)
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        if inner.is_shutting_down() {
            return;
        }
        match run_once(&inner).await {
            Ok(removed) if removed > 0 => info!(removed, "history retention pruned rows"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "history retention sweep failed"),
        }
    }
}

/// One retention pass: prune history older than the configured window.
pub(crate) async fn run_once<P, H, C>(inner: &Arc<Inner<P, H, C>>) -> Result<usize, EngineError>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    let days = u64::from(inner.config.history.retention_days);
    let cutoff = inner.clock.epoch_us().saturating_sub(days.saturating_mul(DAY_US));
    Ok(inner.history.prune_before(cutoff).await?)
}
