//! Error types for proxied backend calls.

use thiserror::Error;

use crate::gate::GateError;

/// Recorded on a failed request as its `error` string (the `Display` output).
pub const CANCELLED_MESSAGE: &str = "cancelled: client disconnected";

/// Errors that can occur while forwarding a call to a backend.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Could not reach the backend (DNS, connection refused, reset).
    #[error("connection to backend failed: {0}")]
    Connect(String),

    /// Backend did not answer within the configured deadline.
    #[error("backend timed out after {0}s")]
    Timeout(u64),

    /// Backend answered with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The response stream broke after the call started.
    #[error("backend stream failed: {0}")]
    Stream(String),

    /// The caller went away before the call finished.
    #[error("{}", CANCELLED_MESSAGE)]
    Cancelled,

    /// An operator killed the request.
    #[error("killed by operator")]
    Killed,

    /// Inbound body is not the JSON document the route expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Gate(#[from] GateError),
}

impl ProxyError {
    /// Classify a transport error. `timeout_secs` is the deadline that applied.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(timeout_secs)
        } else if err.is_connect() || err.is_request() {
            ProxyError::Connect(err.to_string())
        } else {
            ProxyError::Stream(err.to_string())
        }
    }
}
