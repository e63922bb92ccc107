//! Tracker views, kill, and the simulation endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use super::{ApiError, AppState, HistoryQuery, KillResponse, TestAddQuery};
use crate::tracker::{Stats, TrackedRequest};

/// GET /api/queue - Waiting requests in admission order.
pub async fn queue(State(state): State<Arc<AppState>>) -> Json<Vec<TrackedRequest>> {
    Json(state.tracker.queue())
}

/// GET /api/processing - Requests currently being forwarded.
pub async fn processing(State(state): State<Arc<AppState>>) -> Json<Vec<TrackedRequest>> {
    Json(state.tracker.processing())
}

/// GET /api/history - Finished requests, most recent first.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<TrackedRequest>> {
    let limit = query
        .limit
        .unwrap_or(state.config.tracker.default_history_limit);
    Json(state.tracker.history(limit))
}

/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(state.tracker.stats())
}

/// POST /api/kill/:id
pub async fn kill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<KillResponse>, ApiError> {
    match state.tracker.kill(&id) {
        Some(request) => {
            tracing::info!(request_id = %id, service = %request.service, "Request killed");
            Ok(Json(KillResponse {
                status: "killed".to_string(),
                request,
            }))
        }
        None => Err(ApiError::request_not_found(&id)),
    }
}

/// POST /api/test/add - Admit a synthetic request that no backend will serve.
pub async fn test_add(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TestAddQuery>,
) -> Json<TrackedRequest> {
    let request = TrackedRequest::new(query.service, query.model, &query.prompt);
    Json(state.tracker.admit(request))
}

/// POST /api/test/process/:id
pub async fn test_process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TrackedRequest>, ApiError> {
    state
        .tracker
        .start_processing(&id)
        .map(Json)
        .ok_or_else(|| ApiError::request_not_found(&id))
}

/// POST /api/test/complete/:id
pub async fn test_complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TrackedRequest>, ApiError> {
    state
        .tracker
        .complete(&id, Some("Test response".to_string()), None)
        .map(Json)
        .ok_or_else(|| ApiError::request_not_found(&id))
}
