//! Lifecycle tracker configuration

use serde::{Deserialize, Serialize};

/// Sizing for the tracker's history and its live subscribers.
///
/// # Example
///
/// ```toml
/// [tracker]
/// history_capacity = 1000
/// broadcast_history_limit = 50
/// default_history_limit = 100
/// subscriber_buffer = 64
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Number of finished requests kept in memory.
    ///
    /// Default: 1000
    /// The oldest entry (by completion order) is evicted first.
    pub history_capacity: usize,

    /// History entries included in every pushed snapshot.
    ///
    /// Default: 50
    pub broadcast_history_limit: usize,

    /// History entries returned by `GET /api/history` without `?limit`.
    ///
    /// Default: 100
    pub default_history_limit: usize,

    /// Snapshots buffered per live subscriber.
    ///
    /// Default: 64
    /// A subscriber whose buffer is full misses snapshots until it drains.
    pub subscriber_buffer: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            broadcast_history_limit: 50,
            default_history_limit: 100,
            subscriber_buffer: 64,
        }
    }
}
