//! Request lifecycle tracker
//!
//! Single owner of the queue, the in-flight set and the bounded history. Every
//! mutation runs inside one critical section that also publishes the resulting
//! snapshot, so subscribers see each request's statuses in state-machine order.
//!
//! ```text
//! Queued --start_processing--> Processing --complete(ok)--> Completed
//! Queued --kill--> Killed
//! Processing --kill--> Killed
//! Processing --complete(err)--> Failed
//! ```
//!
//! Lookups on unknown or already-terminal ids return `None`; the tracker never
//! panics on a bad id.

pub mod history;
pub mod preview;
pub mod types;

pub use history::History;
pub use preview::{truncate, PreviewAccumulator, PREVIEW_LIMIT};
pub use types::{Metadata, RequestStatus, Snapshot, Stats, TrackedRequest};

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::broadcast::{BroadcastHub, SubscriberId, Subscription};
use crate::config::TrackerConfig;

/// A live (non-terminal) request and the token that aborts its handling task.
#[derive(Debug)]
struct Entry {
    request: TrackedRequest,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct TrackerState {
    queue: VecDeque<Entry>,
    in_flight: HashMap<String, Entry>,
    history: History,
}

impl TrackerState {
    fn take_queued(&mut self, id: &str) -> Option<Entry> {
        let pos = self.queue.iter().position(|e| e.request.id == id)?;
        self.queue.remove(pos)
    }

    fn stats(&self) -> Stats {
        let (completed_count, failed_count, killed_count) = self.history.counts();
        Stats {
            queue_count: self.queue.len(),
            processing_count: self.in_flight.len(),
            completed_count,
            failed_count,
            killed_count,
        }
    }

    fn processing(&self) -> Vec<TrackedRequest> {
        let mut items: Vec<TrackedRequest> =
            self.in_flight.values().map(|e| e.request.clone()).collect();
        items.sort_by_key(|r| r.started_at);
        items
    }

    fn snapshot(&self, history_limit: usize) -> Snapshot {
        Snapshot {
            queue: self.queue.iter().map(|e| e.request.clone()).collect(),
            processing: self.processing(),
            history: self.history.recent(history_limit),
            stats: self.stats(),
        }
    }
}

/// Lifecycle tracker shared by every handler through `Arc`.
pub struct Tracker {
    state: Mutex<TrackerState>,
    hub: BroadcastHub,
    broadcast_history_limit: usize,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                queue: VecDeque::new(),
                in_flight: HashMap::new(),
                history: History::new(config.history_capacity),
            }),
            hub: BroadcastHub::new(config.subscriber_buffer),
            broadcast_history_limit: config.broadcast_history_limit,
        }
    }

    /// Register a new request at the tail of the queue. Never fails.
    pub fn admit(&self, request: TrackedRequest) -> TrackedRequest {
        self.admit_with_token(request).0
    }

    /// Like [`admit`](Self::admit), also returning the token that `kill` trips.
    ///
    /// A fresh id is assigned here, replacing any id the caller's value carried.
    pub fn admit_with_token(&self, mut request: TrackedRequest) -> (TrackedRequest, CancellationToken) {
        let mut state = self.lock();
        request.id = crate::logging::generate_request_id();
        request.status = RequestStatus::Queued;
        request.created_at = Utc::now();
        request.started_at = None;
        request.completed_at = None;
        request.response_preview = None;
        request.error = None;

        tracing::debug!(
            request_id = %request.id,
            service = %request.service,
            model = %request.model,
            "Request queued"
        );

        let cancel = CancellationToken::new();
        state.queue.push_back(Entry {
            request: request.clone(),
            cancel: cancel.clone(),
        });
        self.publish(&state);
        (request, cancel)
    }

    /// Move a queued request into the in-flight set.
    ///
    /// `None` means the request left the queue some other way (usually a kill)
    /// and must not be forwarded to its backend.
    pub fn start_processing(&self, id: &str) -> Option<TrackedRequest> {
        let mut state = self.lock();
        let mut entry = state.take_queued(id)?;

        entry.request.status = RequestStatus::Processing;
        entry.request.started_at = Some(Utc::now().max(entry.request.created_at));
        let request = entry.request.clone();

        tracing::debug!(request_id = %id, service = %request.service, "Request processing");

        state.in_flight.insert(request.id.clone(), entry);
        self.publish(&state);
        Some(request)
    }

    /// Finish an in-flight request.
    ///
    /// An empty or missing `error` marks it completed with the truncated
    /// `response`; otherwise it is marked failed with the truncated error.
    /// Returns `None` when the id is not in flight, which makes repeated calls
    /// harmless.
    pub fn complete(
        &self,
        id: &str,
        response: Option<String>,
        error: Option<String>,
    ) -> Option<TrackedRequest> {
        let mut state = self.lock();
        let mut entry = state.in_flight.remove(id)?;
        let request = &mut entry.request;

        request.completed_at = Some(Utc::now().max(request.started_at.unwrap_or(request.created_at)));
        match error.filter(|e| !e.is_empty()) {
            None => {
                request.status = RequestStatus::Completed;
                request.response_preview = response.as_deref().map(truncate);
            }
            Some(message) => {
                request.status = RequestStatus::Failed;
                request.error = Some(truncate(&message));
            }
        }

        Some(self.retire(&mut state, entry))
    }

    /// Kill a queued or in-flight request.
    ///
    /// The queue is searched first. The entry's cancellation token is tripped
    /// so a task waiting on the gate or streaming from the backend stops.
    pub fn kill(&self, id: &str) -> Option<TrackedRequest> {
        let mut state = self.lock();
        let mut entry = match state.take_queued(id) {
            Some(entry) => entry,
            None => state.in_flight.remove(id)?,
        };

        let request = &mut entry.request;
        request.status = RequestStatus::Killed;
        request.completed_at = Some(Utc::now().max(request.started_at.unwrap_or(request.created_at)));
        entry.cancel.cancel();

        Some(self.retire(&mut state, entry))
    }

    /// Token tripped when the request is killed. `None` once it is terminal.
    pub fn cancellation(&self, id: &str) -> Option<CancellationToken> {
        let state = self.lock();
        state
            .queue
            .iter()
            .find(|e| e.request.id == id)
            .or_else(|| state.in_flight.get(id))
            .map(|e| e.cancel.clone())
    }

    /// Look a request up in whichever container currently holds it.
    pub fn get(&self, id: &str) -> Option<TrackedRequest> {
        let state = self.lock();
        if let Some(entry) = state.queue.iter().find(|e| e.request.id == id) {
            return Some(entry.request.clone());
        }
        if let Some(entry) = state.in_flight.get(id) {
            return Some(entry.request.clone());
        }
        state.history.find(id).cloned()
    }

    pub fn queue(&self) -> Vec<TrackedRequest> {
        self.lock().queue.iter().map(|e| e.request.clone()).collect()
    }

    /// In-flight requests ordered by start time.
    pub fn processing(&self) -> Vec<TrackedRequest> {
        self.lock().processing()
    }

    /// Up to `limit` finished requests, most recent first.
    pub fn history(&self, limit: usize) -> Vec<TrackedRequest> {
        self.lock().history.recent(limit)
    }

    pub fn stats(&self) -> Stats {
        self.lock().stats()
    }

    pub fn snapshot(&self, history_limit: usize) -> Snapshot {
        self.lock().snapshot(history_limit)
    }

    /// Subscribe to future snapshots and get the current one.
    ///
    /// Both happen under the tracker lock, so the first snapshot received on
    /// the subscription is never older than the one returned here.
    pub fn subscribe(&self) -> (Subscription, Snapshot) {
        let state = self.lock();
        let subscription = self.hub.subscribe();
        (subscription, state.snapshot(self.broadcast_history_limit))
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn history_capacity(&self) -> usize {
        self.lock().history.capacity()
    }

    /// Move a terminal entry into history and notify.
    fn retire(&self, state: &mut TrackerState, entry: Entry) -> TrackedRequest {
        let request = entry.request;
        let status = request.status;

        metrics::counter!("turnstile_requests_total",
            "service" => request.service.clone(),
            "status" => status.as_str()
        )
        .increment(1);
        if let Some(duration) = request.duration() {
            metrics::histogram!("turnstile_request_duration_seconds",
                "service" => request.service.clone()
            )
            .record(duration.num_milliseconds().max(0) as f64 / 1000.0);
        }

        tracing::debug!(
            request_id = %request.id,
            service = %request.service,
            status = %status,
            "Request finished"
        );

        state.history.push(request.clone());
        self.publish(state);
        request
    }

    /// Called with the lock held after every mutation.
    fn publish(&self, state: &TrackerState) {
        metrics::gauge!("turnstile_queue_depth").set(state.queue.len() as f64);
        metrics::gauge!("turnstile_in_flight").set(state.in_flight.len() as f64);

        if self.hub.subscriber_count() == 0 {
            return;
        }
        let snapshot = state.snapshot(self.broadcast_history_limit);
        self.hub.publish(Arc::new(snapshot));
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // State is only mutated in short sections without panicking paths, so
        // a poisoned lock still holds consistent data.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}
