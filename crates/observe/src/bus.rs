// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer fan-out with bounded per-subscriber buffers.

use crate::{Notice, Observer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberHandle(u64);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Notice>,
}

struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    sample_one_in_n: u32,
    debug_log_all: bool,
    transition_seq: AtomicU64,
    dropped: AtomicU64,
    next_id: AtomicU64,
}

/// Fan-out of notices to zero or more subscribers.
///
/// `publish` never blocks: a subscriber whose buffer is full misses the
/// notice, a subscriber whose channel closed is detached. Transition
/// snapshots are sampled one-in-N; lifecycle notices always go out.
#[derive(Clone)]
pub struct ObserverBus {
    inner: Arc<BusInner>,
}

impl ObserverBus {
    pub fn new(sample_one_in_n: u32, debug_log_all: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                sample_one_in_n: sample_one_in_n.max(1),
                debug_log_all,
                transition_seq: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a subscriber with a buffer of `buffer` notices; spawns its
    /// forwarding task.
    pub fn subscribe<O: Observer>(&self, observer: O, buffer: usize) -> SubscriberHandle {
        let (tx, mut rx) = mpsc::channel(buffer.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                if let Err(e) = observer.notify(&notice).await {
                    warn!(error = %e, "observer delivery failed");
                }
            }
        });

        self.inner.subscribers.lock().push(Subscriber { id, tx });
        SubscriberHandle(id)
    }

    /// Detach a subscriber; its forwarding task ends once it drains.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        self.inner.subscribers.lock().retain(|s| s.id != handle.0);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Notices dropped because a subscriber's buffer was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Whether the sampler would pass the next transition snapshot.
    fn sample(&self) -> bool {
        if self.inner.debug_log_all || self.inner.sample_one_in_n == 1 {
            return true;
        }
        let seq = self.inner.transition_seq.fetch_add(1, Ordering::SeqCst);
        seq % u64::from(self.inner.sample_one_in_n) == 0
    }

    /// Publish a notice to all subscribers. Never blocks.
    pub fn publish(&self, notice: Notice) {
        if matches!(notice, Notice::Transition(_)) && !self.sample() {
            return;
        }

        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|s| match s.tx.try_send(notice.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::SeqCst);
                debug!(subscriber = s.id, "observer buffer full, notice dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = s.id, "observer channel closed, detaching");
                false
            }
        });
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
