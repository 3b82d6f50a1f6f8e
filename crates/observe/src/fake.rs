// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording observer for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::{LifecycleKind, Notice, Observer, ObserverError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use xbar_core::TransitionSnapshot;

/// Observer that records every delivered notice.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded notices, in delivery order.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Recorded transition snapshots, in delivery order.
    pub fn snapshots(&self) -> Vec<TransitionSnapshot> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| n.snapshot().cloned())
            .collect()
    }

    /// Recorded lifecycle kinds, in delivery order.
    pub fn lifecycle_kinds(&self) -> Vec<LifecycleKind> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notice::Lifecycle { kind, .. } => Some(*kind),
                Notice::Transition(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.notices.lock().clear();
    }
}

#[async_trait]
impl Observer for RecordingObserver {
    async fn notify(&self, notice: &Notice) -> Result<(), ObserverError> {
        self.notices.lock().push(notice.clone());
        Ok(())
    }
}
