//! Request, response and error types for the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::proxy::ProxyError;
use crate::tracker::{Stats, TrackedRequest};

/// `?limit=` on `GET /api/history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Body of a successful `POST /api/kill/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillResponse {
    pub status: String,
    pub request: TrackedRequest,
}

/// Query of `POST /api/test/add`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestAddQuery {
    pub service: String,
    pub model: String,
    pub prompt: String,
}

impl Default for TestAddQuery {
    fn default() -> Self {
        Self {
            service: "ollama".to_string(),
            model: "llama2".to_string(),
            prompt: "Test".to_string(),
        }
    }
}

/// Inbound control-channel message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    Kill { request_id: String },
}

/// `GET /health` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub stats: Stats,
    pub backends: Vec<BackendHealth>,
}

/// Gate occupancy of one backend.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackendHealth {
    pub name: String,
    pub url: String,
    pub capacity: usize,
    pub available: usize,
}

/// API error envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

/// Error details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    fn new(message: impl Into<String>, r#type: &str, code: &str) -> Self {
        Self {
            error: ApiErrorBody {
                message: message.into(),
                r#type: r#type.to_string(),
                code: Some(code.to_string()),
            },
        }
    }

    /// Create a bad request error (400).
    pub fn bad_request(message: &str) -> Self {
        Self::new(message, "invalid_request_error", "invalid_request_error")
    }

    /// Create a request not found error (404).
    pub fn request_not_found(id: &str) -> Self {
        Self::new(
            format!("Request '{}' not found", id),
            "invalid_request_error",
            "request_not_found",
        )
    }

    /// Create a killed error (409): the request was killed before it got a reply.
    pub fn request_killed() -> Self {
        Self::new("Request was killed by an operator", "request_error", "request_killed")
    }

    /// Create a bad gateway error (502).
    pub fn bad_gateway(message: &str) -> Self {
        Self::new(message, "server_error", "bad_gateway")
    }

    /// Create a gateway timeout error (504).
    pub fn gateway_timeout(message: &str) -> Self {
        Self::new(message, "server_error", "gateway_timeout")
    }

    /// Get the HTTP status code for this error.
    fn status_code(&self) -> StatusCode {
        match self.error.code.as_deref() {
            Some("invalid_request_error") => StatusCode::BAD_REQUEST,
            Some("request_not_found") => StatusCode::NOT_FOUND,
            Some("request_killed") => StatusCode::CONFLICT,
            Some("bad_gateway") => StatusCode::BAD_GATEWAY,
            Some("gateway_timeout") => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        let message = err.to_string();
        match err {
            ProxyError::InvalidPayload(_) => ApiError::bad_request(&message),
            ProxyError::Timeout(_) => ApiError::gateway_timeout(&message),
            ProxyError::Killed | ProxyError::Cancelled => ApiError::request_killed(),
            ProxyError::Connect(_)
            | ProxyError::Upstream { .. }
            | ProxyError::Stream(_)
            | ProxyError::Gate(_) => ApiError::bad_gateway(&message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
