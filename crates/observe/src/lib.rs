// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! xbar-observe: fan-out of transition snapshots and lifecycle notices to
//! subscribers. Delivery is best-effort and never blocks the kernel: each
//! subscriber gets a bounded buffer and a forwarding task; slow subscribers
//! drop notices, closed subscribers are detached.

mod bus;
mod log;

pub use bus::{ObserverBus, SubscriberHandle};
pub use log::LogObserver;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::RecordingObserver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xbar_core::{MachineId, TransitionSnapshot};

/// Errors from observer delivery
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Lifecycle notifications emitted by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Created,
    Registered,
    Rehydrated,
    Evicted,
    Archived,
    ShutdownStarted,
}

/// One notice on the observer bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    Transition(Box<TransitionSnapshot>),
    Lifecycle {
        kind: LifecycleKind,
        /// `None` for registry-wide notices (shutdown).
        machine_id: Option<MachineId>,
        timestamp_us: u64,
    },
}

impl Notice {
    pub fn lifecycle(kind: LifecycleKind, machine_id: MachineId, timestamp_us: u64) -> Self {
        Self::Lifecycle {
            kind,
            machine_id: Some(machine_id),
            timestamp_us,
        }
    }

    pub fn shutdown_started(timestamp_us: u64) -> Self {
        Self::Lifecycle {
            kind: LifecycleKind::ShutdownStarted,
            machine_id: None,
            timestamp_us,
        }
    }

    /// The snapshot behind a transition notice.
    pub fn snapshot(&self) -> Option<&TransitionSnapshot> {
        match self {
            Notice::Transition(snapshot) => Some(snapshot),
            Notice::Lifecycle { .. } => None,
        }
    }
}

/// A subscriber to registry notices
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Deliver one notice. Failures are logged by the bus, never retried.
    async fn notify(&self, notice: &Notice) -> Result<(), ObserverError>;
}
