// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the kernel and registry

use thiserror::Error;
use xbar_core::{MachineId, MachineStatus};
use xbar_store::StoreError;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No live machine, no stored row (or a completed one), and no factory.
    #[error("unknown machine: {0}")]
    UnknownMachine(MachineId),
    /// The machine no longer accepts events.
    #[error("machine {id} rejects events in status {status}")]
    Stopped { id: MachineId, status: MachineStatus },
    /// The machine has entered a final state.
    #[error("machine {id} is in final state {state}")]
    FinalState { id: MachineId, state: String },
    /// The per-machine queue stayed full past the enqueue deadline.
    #[error("event queue full for machine {0}")]
    QueueFull(MachineId),
    /// The machine was evicted while routing; rerouting rehydrates it.
    #[error("machine {0} was evicted, reroute to rehydrate")]
    EvictedRetry(MachineId),
    #[error("duplicate machine id: {0}")]
    DuplicateMachine(MachineId),
    /// A context names a state the definition does not have.
    #[error("machine {id} references undefined state '{state}'")]
    UndefinedState { id: MachineId, state: String },
    /// A completed context can never be restored.
    #[error("machine {0} is complete and cannot be restored")]
    Completed(MachineId),
    #[error("registry '{0}' is shutting down")]
    ShuttingDown(String),
    #[error("snapshot serialization failed: {0}")]
    Serialize(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
