// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer management for state timeouts.
//!
//! One scheduler per registry. A machine has at most one armed timer,
//! tagged with the version at which it was armed; the kernel drops firings
//! whose tag no longer matches. Fired timers are collected by the
//! registry's driver loop (or by tests polling with a fake clock) and
//! delivered through the per-machine queues, so they serialize with events.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use xbar_core::MachineId;

/// Driver polling interval.
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(10);

/// Timer entry
#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
    armed_version: u64,
}

/// Manages the armed timers of one registry
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    timers: HashMap<MachineId, Timer>,
}

impl TimeoutScheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for a machine.
    pub fn arm(&mut self, id: MachineId, armed_version: u64, duration: Duration, now: Instant) {
        self.timers.insert(
            id,
            Timer {
                fires_at: now + duration,
                armed_version,
            },
        );
    }

    /// Cancel a machine's timer. Idempotent.
    pub fn cancel(&mut self, id: &MachineId) {
        self.timers.remove(id);
    }

    /// Collect all timers due at `now`, removing them.
    ///
    /// Returns `(machine id, armed version)` pairs.
    pub fn fired(&mut self, now: Instant) -> Vec<(MachineId, u64)> {
        let due: Vec<MachineId> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.fires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        due.into_iter()
            .filter_map(|id| {
                let timer = self.timers.remove(&id)?;
                Some((id, timer.armed_version))
            })
            .collect()
    }

    /// Get the next timer fire time
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    /// Check if there are any pending timers
    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
