// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rehydration: rebuilding a machine from its persisted row.
//!
//! Entry actions never re-run (their side effects happened in the first
//! activation). If the restored state's timeout elapsed while the machine
//! was evicted, a synthetic timeout fires before the machine rejoins the
//! live map, so the timeout transition is the first observable action of
//! the new activation. The registry's per-id lock guarantees at most one
//! rehydration in flight per machine.

use crate::error::EngineError;
use crate::kernel::{MachineInstance, TimeoutResume};
use crate::registry::Inner;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use xbar_core::{Clock, Event, MachineId};
use xbar_observe::{LifecycleKind, Notice};
use xbar_store::{codec, HistoryStore, MachineRecord, PersistenceProvider};

pub(crate) async fn rehydrate<P, H, C>(
    inner: &Arc<Inner<P, H, C>>,
    id: &MachineId,
    record: MachineRecord,
) -> Result<(), EngineError>
where
    P: PersistenceProvider,
    H: HistoryStore,
    C: Clock,
{
    let mut context = codec::from_blob(&record.context_blob)?;
    if context.id != *id {
        warn!(machine = %id, stored = %context.id, "stored context id mismatch, correcting");
        context.id = id.clone();
    }

    let mut instance = MachineInstance::restore(Arc::clone(&inner.definition), context)?;

    let now_us = inner.clock.epoch_us();
    let elapsed_us = now_us.saturating_sub(record.last_state_change_us);
    let resume = instance.resume_timeout(Duration::from_micros(elapsed_us));

    // Observers see the restored state before anything else happens in
    // the new activation
    let snapshot = instance.rehydration_snapshot(&inner.clock)?;
    inner
        .bus
        .publish(Notice::lifecycle(LifecycleKind::Rehydrated, id.clone(), now_us));
    inner.bus.publish(Notice::Transition(Box::new(snapshot)));

    let machine = Arc::new(Mutex::new(instance));

    match resume {
        TimeoutResume::Expired { armed_version } => {
            info!(
                machine = %id,
                elapsed_us,
                "timeout elapsed while evicted, firing synthetic timeout"
            );
            let mut event = Event::timeout(armed_version);
            event.timestamp_us = now_us;
            let include = inner.config.observer.include_context_before;
            let fired = machine.lock().fire(&event, &inner.clock, include);
            match fired {
                Ok(result) => inner.execute_effects(id, &machine, result.effects).await,
                Err(e) => warn!(machine = %id, error = %e, "synthetic timeout failed"),
            }
        }
        TimeoutResume::Remaining {
            duration,
            armed_version,
        } => {
            inner
                .scheduler
                .lock()
                .arm(id.clone(), armed_version, duration, inner.clock.now());
        }
        TimeoutResume::None => {}
    }

    // The synthetic timeout may have driven the machine straight back
    // offline (persisted) or into a final state (queued for archival);
    // only a machine still accepting events joins the live map.
    let accepts = machine.lock().status().accepts_events();
    if accepts {
        inner.register_cell(machine, false)?;
    }
    Ok(())
}
