//! Request and status model shared by the tracker, the hub and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::preview::truncate;

/// Free-form auxiliary attributes attached at admission time.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Killed,
}

impl RequestStatus {
    /// Terminal statuses have no outgoing transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Killed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Killed => "killed",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admitted call, from admission until it lands in history.
///
/// Only the tracker mutates `status`, the timestamps and the outcome fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRequest {
    pub id: String,
    pub service: String,
    pub model: String,
    pub prompt_preview: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TrackedRequest {
    /// Build a fresh request with a new id. The prompt is truncated to the
    /// preview limit.
    pub fn new(service: impl Into<String>, model: impl Into<String>, prompt: &str) -> Self {
        Self {
            id: crate::logging::generate_request_id(),
            service: service.into(),
            model: model.into(),
            prompt_preview: truncate(prompt),
            status: RequestStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            response_preview: None,
            error: None,
            metadata: Metadata::new(),
        }
    }

    /// Attach auxiliary attributes.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Wall-clock time spent between admission and the terminal transition.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }
}

/// Aggregate counters over the three containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub queue_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub killed_count: usize,
}

/// Instant-in-time view of the tracker.
///
/// This is also the payload every subscriber receives; there is no delta
/// encoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub queue: Vec<TrackedRequest>,
    pub processing: Vec<TrackedRequest>,
    pub history: Vec<TrackedRequest>,
    pub stats: Stats,
}
