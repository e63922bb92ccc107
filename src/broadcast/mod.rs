//! Snapshot fan-out to live watchers.
//!
//! Every subscriber owns a bounded channel. `publish` hands the snapshot to
//! each channel with `try_send` and never waits: a subscriber whose buffer is
//! full misses that snapshot, and a subscriber whose receiver is gone is
//! removed from the registry.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::tracker::Snapshot;

/// Identifier handed out by [`BroadcastHub::subscribe`].
pub type SubscriberId = u64;

/// Default per-subscriber buffer depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<Snapshot>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next snapshot. Returns `None` once the subscriber has been
    /// removed from the hub.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.recv().await
    }

    /// Non-blocking receive, mostly useful in tests.
    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the snapshot
    pub delivered: usize,
    /// Subscribers skipped because their buffer was full
    pub skipped: usize,
    /// Subscribers removed because their receiver was dropped
    pub pruned: usize,
}

/// Registry of subscriber channels.
pub struct BroadcastHub {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<Snapshot>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, tx);
        tracing::debug!(subscriber_id = id, "Subscriber registered");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber_id = id, "Subscriber removed");
        }
    }

    /// Offer `snapshot` to every subscriber without blocking.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> PublishReport {
        let mut report = PublishReport::default();

        self.subscribers
            .retain(|_, tx| match tx.try_send(Arc::clone(&snapshot)) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    report.skipped += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    report.pruned += 1;
                    false
                }
            });

        if report.skipped > 0 {
            metrics::counter!("turnstile_broadcast_dropped_total").increment(report.skipped as u64);
            tracing::trace!(skipped = report.skipped, "Slow subscribers missed a snapshot");
        }

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
