// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer that writes notices through `tracing`.

use crate::{Notice, Observer, ObserverError};
use async_trait::async_trait;
use tracing::info;

/// Logs every delivered notice at info level with structured fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observer for LogObserver {
    async fn notify(&self, notice: &Notice) -> Result<(), ObserverError> {
        match notice {
            Notice::Transition(snapshot) => {
                info!(
                    machine = %snapshot.machine_id,
                    version = snapshot.version,
                    kind = ?snapshot.kind,
                    from = snapshot.state_before.as_deref().unwrap_or("-"),
                    to = %snapshot.state_after,
                    event = %snapshot.event_type,
                    "transition"
                );
            }
            Notice::Lifecycle {
                kind,
                machine_id,
                timestamp_us,
            } => {
                info!(
                    machine = machine_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
                    kind = ?kind,
                    at_us = timestamp_us,
                    "lifecycle"
                );
            }
        }
        Ok(())
    }
}
