//! Health check endpoint handler.

use crate::api::{AppState, BackendHealth, HealthResponse};
use axum::{extract::State, Json};
use std::sync::Arc;

/// GET /health - Uptime, tracker stats and gate occupancy. Never mutates.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backends = [&state.ollama, &state.qdrant]
        .into_iter()
        .map(|proxy| BackendHealth {
            name: proxy.service().to_string(),
            url: proxy.base_url().to_string(),
            capacity: proxy.gate().capacity(),
            available: proxy.gate().available(),
        })
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.metrics_collector.uptime_seconds(),
        stats: state.tracker.stats(),
        backends,
    })
}
