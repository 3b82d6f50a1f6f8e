// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-machine event queues.
//!
//! One bounded FIFO and one consumer task per machine id. The single
//! consumer is what serializes event processing per machine: the kernel
//! never needs a lock of its own, and events are observed in enqueue
//! order. Dropping the dispatcher closes the queue; the consumer drains
//! what is left and exits.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use xbar_core::Event;

/// Why an enqueue did not happen.
#[derive(Debug)]
pub(crate) enum EnqueueError {
    /// Queue stayed full past the deadline.
    Full,
    /// Consumer is gone (machine evicted); the event is handed back.
    Closed(Event),
}

/// Sender half of one machine's queue.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::Sender<Event>,
}

impl Dispatcher {
    /// Create the queue and spawn its consumer task.
    pub(crate) fn spawn<F, Fut>(capacity: usize, mut handle: F) -> Self
    where
        F: FnMut(Event) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle(event).await;
            }
        });
        Self { tx }
    }

    /// Enqueue an event, blocking up to `deadline` if the queue is full.
    pub(crate) async fn enqueue(
        &self,
        event: Event,
        deadline: Duration,
    ) -> Result<(), EnqueueError> {
        match tokio::time::timeout(deadline, self.tx.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(send_error)) => Err(EnqueueError::Closed(send_error.0)),
            Err(_elapsed) => Err(EnqueueError::Full),
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
