//! # Metrics
//!
//! Prometheus export of the tracker and gate state at `GET /metrics`.
//!
//! **Counters:**
//! - `turnstile_requests_total{service, status}` - Requests that reached a terminal status
//! - `turnstile_broadcast_dropped_total` - Snapshots skipped for slow subscribers
//!
//! **Histograms:**
//! - `turnstile_request_duration_seconds{service}` - Admission to terminal transition
//!
//! **Gauges:**
//! - `turnstile_queue_depth` - Requests waiting for a gate slot
//! - `turnstile_in_flight` - Requests being forwarded
//! - `turnstile_gate_available{backend}` - Free slots per backend gate

pub mod handler;

// Re-export PrometheusBuilder for test compatibility
pub use metrics_exporter_prometheus::PrometheusBuilder;

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

use crate::tracker::Tracker;

/// Renders metrics and refreshes the tracker gauges on scrape.
pub struct MetricsCollector {
    tracker: Arc<Tracker>,
    start_time: Instant,
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    pub fn new(tracker: Arc<Tracker>, start_time: Instant, prometheus_handle: PrometheusHandle) -> Self {
        Self {
            tracker,
            start_time,
            prometheus_handle,
        }
    }

    /// Set the container gauges from a fresh stats read.
    pub fn update_tracker_gauges(&self) {
        let stats = self.tracker.stats();
        metrics::gauge!("turnstile_queue_depth").set(stats.queue_count as f64);
        metrics::gauge!("turnstile_in_flight").set(stats.processing_count as f64);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

/// Install the global Prometheus recorder.
///
/// Durations are bucketed in seconds; inference calls commonly run for
/// minutes. Fails if a recorder is already installed.
pub fn setup_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::Matcher;

    let duration_buckets = &[
        0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("turnstile_request_duration_seconds".to_string()),
            duration_buckets,
        )?
        .install_recorder()?;

    Ok(handle)
}

/// Global handle if this is the first call, otherwise a detached one.
pub fn handle_or_detached() -> PrometheusHandle {
    setup_metrics().unwrap_or_else(|e| {
        tracing::debug!("Metrics already initialized, creating new handle: {}", e);
        PrometheusBuilder::new().build_recorder().handle()
    })
}
