//! Bounded history of terminal requests, most recent first.

use std::collections::VecDeque;

use super::types::{RequestStatus, TrackedRequest};

/// Ring buffer of finished requests.
///
/// New entries go to the head. When the buffer is full the oldest entry (the
/// tail) is evicted. Per-status counts are kept in step with the contents so
/// stats never need a scan.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<TrackedRequest>,
    capacity: usize,
    completed: usize,
    failed: usize,
    killed: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            completed: 0,
            failed: 0,
            killed: 0,
        }
    }

    /// Insert a terminal request at the head. Returns the evicted entry, if any.
    pub fn push(&mut self, entry: TrackedRequest) -> Option<TrackedRequest> {
        debug_assert!(entry.status.is_terminal());
        self.adjust(entry.status, true);
        self.entries.push_front(entry);

        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_back()?;
            self.adjust(evicted.status, false);
            return Some(evicted);
        }
        None
    }

    /// Up to `limit` entries, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<TrackedRequest> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn find(&self, id: &str) -> Option<&TrackedRequest> {
        self.entries.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (completed, failed, killed)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.completed, self.failed, self.killed)
    }

    fn adjust(&mut self, status: RequestStatus, added: bool) {
        let slot = match status {
            RequestStatus::Completed => &mut self.completed,
            RequestStatus::Failed => &mut self.failed,
            RequestStatus::Killed => &mut self.killed,
            RequestStatus::Queued | RequestStatus::Processing => return,
        };
        if added {
            *slot += 1;
        } else {
            *slot = slot.saturating_sub(1);
        }
    }
}
