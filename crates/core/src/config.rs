// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Registries are configured per machine-type namespace;
//! there is no process-global configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which persistence backend a registry uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Non-durable, for tests and development
    Memory,
    /// One durable JSON document per machine id
    File,
    /// File stores sharded by id hash
    Sharded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: BackendKind,
    /// Save attempts on the eviction path before giving up.
    pub retry_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Bounded capacity of each per-machine event queue.
    pub queue_capacity: usize,
    /// How long `route_event` may block on a full queue.
    pub enqueue_deadline_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            enqueue_deadline_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub worker_count: usize,
    pub retention_days: u32,
    /// First archival retry delay; doubles per attempt (3 attempts total).
    pub retry_base_delay_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            worker_count: 2,
            retention_days: 30,
            retry_base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Deliver one in N transition snapshots. Lifecycle notices are never
    /// sampled.
    pub sample_one_in_n: u32,
    /// Explicit override: deliver every snapshot regardless of sampling.
    pub debug_log_all: bool,
    /// Include the pre-transition context in snapshots.
    pub include_context_before: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            sample_one_in_n: 1,
            debug_log_all: false,
            include_context_before: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Budget for draining dispatchers and persisting machines before a
    /// hard stop.
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 30_000,
        }
    }
}

/// Per-registry configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub persistence: PersistenceConfig,
    pub dispatcher: DispatcherConfig,
    pub history: HistoryConfig,
    pub observer: ObserverConfig,
    pub shutdown: ShutdownConfig,
}

impl RuntimeConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.persistence.retry_base_delay_ms)
    }

    pub fn enqueue_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatcher.enqueue_deadline_ms)
    }

    pub fn history_retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.history.retry_base_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_period_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
