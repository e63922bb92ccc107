//! Request id generation and the HTTP trace span

use axum::body::Body;
use axum::http::Request;
use tracing::Span;
use uuid::Uuid;

/// Generate a new request ID using UUID v4
///
/// Every tracked request gets one at admission; it is the key used by kill,
/// the control channel and the logs.
///
/// ```
/// use turnstile::logging::generate_request_id;
///
/// let request_id = generate_request_id();
/// assert_eq!(request_id.len(), 36);
/// ```
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span for `TraceLayer::make_span_with`: one per inbound HTTP call.
pub fn http_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
    )
}
