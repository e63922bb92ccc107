//! Shared helpers for Turnstile integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;
use std::time::Duration;
use turnstile::api::{create_router, AppState};
use turnstile::config::{BackendConfig, TurnstileConfig};

/// An address nothing listens on.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

/// Two NDJSON records whose `response` fragments spell "hello".
pub const GENERATE_STREAM: &str =
    "{\"response\":\"hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":true}\n";

pub const CHAT_STREAM: &str = "{\"message\":{\"role\":\"assistant\",\"content\":\"hel\"},\"done\":false}\n\
{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":true}\n";

/// Config pointing both backends at the given URLs, test endpoints on.
pub fn make_config(ollama_url: &str, qdrant_url: &str) -> TurnstileConfig {
    let mut config = TurnstileConfig::default();
    config.server.enable_test_endpoints = true;
    config.backends.ollama = BackendConfig {
        url: ollama_url.to_string(),
        timeout_seconds: 5,
        ..BackendConfig::ollama()
    };
    config.backends.qdrant = BackendConfig {
        url: qdrant_url.to_string(),
        timeout_seconds: 5,
        ..BackendConfig::qdrant()
    };
    config.server.passthrough_timeout_seconds = 5;
    config
}

/// Router plus the state behind it, so tests can look at the tracker.
pub fn make_app(config: TurnstileConfig) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(Arc::new(config)).unwrap());
    (create_router(Arc::clone(&state)), state)
}

/// App with both backends unreachable.
pub fn make_offline_app() -> (axum::Router, Arc<AppState>) {
    make_app(make_config(UNREACHABLE_URL, UNREACHABLE_URL))
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Read an entire response body as a string.
pub async fn body_to_string(body: Body) -> String {
    use futures::StreamExt;
    let mut stream = body.into_data_stream();
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    String::from_utf8(bytes).unwrap()
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}

/// Poll until `check` holds, panicking after two seconds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Serve `router` on a free local port and return its base URL.
pub async fn spawn_backend(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// NDJSON reply that sends `records` one at a time, `gap` apart.
pub fn paced_ndjson(
    records: Vec<String>,
    gap: Duration,
) -> axum::response::Response {
    let stream = async_stream::stream! {
        for (i, record) in records.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(gap).await;
            }
            yield Ok::<_, std::io::Error>(axum::body::Bytes::from(record));
        }
    };
    axum::response::Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Reply with `status` that sends `first` and then breaks the connection.
pub fn broken_reply(status: u16, first: &'static str) -> axum::response::Response {
    let stream = async_stream::stream! {
        yield Ok::<_, std::io::Error>(axum::body::Bytes::from(first));
        tokio::time::sleep(Duration::from_millis(50)).await;
        yield Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "backend crashed"));
    };
    axum::response::Response::builder()
        .status(status)
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Read a body until it ends or errors. Returns the bytes seen and whether it
/// ended in an error.
pub async fn body_until_error(body: Body) -> (String, bool) {
    use futures::StreamExt;
    let mut stream = body.into_data_stream();
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(_) => return (String::from_utf8_lossy(&bytes).into_owned(), true),
        }
    }
    (String::from_utf8_lossy(&bytes).into_owned(), false)
}
