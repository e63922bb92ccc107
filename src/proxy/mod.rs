//! Backend proxy adapters
//!
//! One [`ProxyAdapter`] per upstream service. A tracked call goes through
//! admission, waits for a gate slot, is marked processing, and is then
//! forwarded with its original body. The reply is relayed to the caller while
//! a preview is built on the side. Untracked calls skip all of that and are
//! forwarded with a short timeout.
//!
//! Whatever happens to a tracked call (success, backend failure, operator
//! kill, or the caller hanging up) the tracker sees exactly one terminal
//! transition and the gate slot is returned.

pub mod error;
pub mod ndjson;
pub mod ollama;
pub mod qdrant;

pub use error::{ProxyError, CANCELLED_MESSAGE};
pub use ndjson::{FragmentFn, NdjsonPreview};

use axum::body::{Body, Bytes};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::gate::{CapacityGate, GatePermit};
use crate::tracker::{preview::truncate_to, TrackedRequest, Tracker};

/// Characters of a non-2xx reply body kept in the recorded error.
const UPSTREAM_BODY_PREVIEW: usize = 200;

const NDJSON: &str = "application/x-ndjson";
const JSON: &str = "application/json";

/// How the backend's reply is relayed and summarised.
pub enum Relay {
    /// Stream chunks through as they arrive; preview from NDJSON records.
    Stream(FragmentFn),
    /// Read the whole JSON reply, then relay it with a summary preview.
    Buffered(Box<dyn FnOnce(&Value) -> String + Send>),
}

/// A call that goes through the tracker and the gate.
pub struct TrackedCall {
    pub request: TrackedRequest,
    pub method: Method,
    /// Path below the service prefix, e.g. `api/generate`
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
    pub relay: Relay,
}

/// Settles a tracked request exactly once.
///
/// If dropped unsettled (the caller went away, or the handler bailed out) a
/// queued request is killed and an in-flight one fails as cancelled.
struct CompletionGuard {
    tracker: Arc<Tracker>,
    id: String,
    settled: bool,
}

impl CompletionGuard {
    fn new(tracker: Arc<Tracker>, id: String) -> Self {
        Self {
            tracker,
            id,
            settled: false,
        }
    }

    fn complete(&mut self, response: Option<String>) {
        self.settled = true;
        self.tracker.complete(&self.id, response, None);
    }

    fn fail(&mut self, err: &ProxyError) {
        self.settled = true;
        self.tracker.complete(&self.id, None, Some(err.to_string()));
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self
            .tracker
            .complete(&self.id, None, Some(ProxyError::Cancelled.to_string()))
            .is_some()
        {
            tracing::info!(request_id = %self.id, "Caller disconnected mid-call");
        } else if self.tracker.kill(&self.id).is_some() {
            tracing::info!(request_id = %self.id, "Caller disconnected while queued");
        }
    }
}

/// Forwarding front for one backend.
pub struct ProxyAdapter {
    service: &'static str,
    base_url: String,
    client: reqwest::Client,
    gate: CapacityGate,
    tracker: Arc<Tracker>,
    call_timeout_secs: u64,
    passthrough_timeout_secs: u64,
}

impl ProxyAdapter {
    pub fn new(
        service: &'static str,
        config: &BackendConfig,
        passthrough_timeout_secs: u64,
        client: reqwest::Client,
        tracker: Arc<Tracker>,
    ) -> Self {
        Self {
            service,
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            gate: CapacityGate::new(service, config.max_concurrent),
            tracker,
            call_timeout_secs: config.timeout_seconds,
            passthrough_timeout_secs,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn gate(&self) -> &CapacityGate {
        &self.gate
    }

    fn url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    /// Run a tracked call to completion (or to the start of its stream).
    ///
    /// Connection failures and timeouts come back as `Err`. A non-2xx reply is
    /// relayed to the caller as-is and recorded as a failure.
    ///
    /// The backend timeout bounds the wait for response headers and each
    /// silence between body chunks, never the whole stream.
    #[tracing::instrument(skip_all, fields(service = self.service, request_id))]
    pub async fn forward(&self, call: TrackedCall) -> Result<Response, ProxyError> {
        let TrackedCall {
            request,
            method,
            path,
            query,
            body,
            relay,
        } = call;

        let (request, cancel) = self.tracker.admit_with_token(request);
        let id = request.id;
        tracing::Span::current().record("request_id", id.as_str());
        let mut guard = CompletionGuard::new(Arc::clone(&self.tracker), id.clone());

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Killed),
            permit = self.gate.acquire() => permit?,
        };

        if self.tracker.start_processing(&id).is_none() {
            // killed between grant and start; the permit drops here
            return Err(ProxyError::Killed);
        }

        let send = self
            .client
            .request(method, self.url(&path, query.as_deref()))
            .header(CONTENT_TYPE, JSON)
            .body(body)
            .send();
        let deadline = Duration::from_secs(self.call_timeout_secs);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Killed),
            result = tokio::time::timeout(deadline, send) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    let err = ProxyError::from_reqwest(e, self.call_timeout_secs);
                    tracing::warn!(error = %err, "Backend call failed");
                    guard.fail(&err);
                    return Err(err);
                }
                Err(_) => {
                    let err = ProxyError::Timeout(self.call_timeout_secs);
                    tracing::warn!(error = %err, "Backend did not answer");
                    guard.fail(&err);
                    return Err(err);
                }
            },
        };

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();

        if !status.is_success() {
            let bytes = match read_body(response, self.call_timeout_secs).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(error = %err, status = status.as_u16(), "Backend error reply could not be read");
                    guard.fail(&err);
                    return Err(err);
                }
            };
            let err = ProxyError::Upstream {
                status: status.as_u16(),
                body: truncate_to(&String::from_utf8_lossy(&bytes), UPSTREAM_BODY_PREVIEW),
            };
            tracing::warn!(error = %err, "Backend rejected call");
            guard.fail(&err);
            return Ok(relay_response(status, content_type, Body::from(bytes)));
        }

        match relay {
            Relay::Buffered(summarize) => {
                let bytes = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProxyError::Killed),
                    result = read_body(response, self.call_timeout_secs) => result,
                };
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(error = %err, "Backend reply could not be read");
                        guard.fail(&err);
                        return Err(err);
                    }
                };
                let summary = serde_json::from_slice::<Value>(&bytes)
                    .ok()
                    .map(|reply| summarize(&reply));
                guard.complete(summary);
                drop(permit);

                let content_type = content_type.or(Some(HeaderValue::from_static(JSON)));
                Ok(relay_response(status, content_type, Body::from(bytes)))
            }
            Relay::Stream(extract) => {
                let stream = relay_stream(
                    response,
                    extract,
                    guard,
                    permit,
                    cancel,
                    self.call_timeout_secs,
                );
                let content_type = content_type.or(Some(HeaderValue::from_static(NDJSON)));
                Ok(relay_response(status, content_type, Body::from_stream(stream)))
            }
        }
    }

    /// Forward an untracked call with the passthrough timeout.
    #[tracing::instrument(skip_all, fields(service = self.service, %method, path = %path))]
    pub async fn passthrough(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        content_type: Option<HeaderValue>,
        body: Bytes,
    ) -> Result<Response, ProxyError> {
        let mut builder = self
            .client
            .request(method, self.url(path, query))
            .timeout(Duration::from_secs(self.passthrough_timeout_secs));
        if !body.is_empty() {
            let content_type = content_type.unwrap_or_else(|| HeaderValue::from_static(JSON));
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProxyError::from_reqwest(e, self.passthrough_timeout_secs))?;
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProxyError::from_reqwest(e, self.passthrough_timeout_secs))?;

        tracing::debug!(status = status.as_u16(), bytes = bytes.len(), "Passthrough relayed");
        Ok(relay_response(status, content_type, Body::from(bytes)))
    }
}

/// Read a whole reply body within `timeout_secs`.
async fn read_body(response: reqwest::Response, timeout_secs: u64) -> Result<Bytes, ProxyError> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), response.bytes()).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(ProxyError::from_reqwest(e, timeout_secs)),
        Err(_) => Err(ProxyError::Timeout(timeout_secs)),
    }
}

enum Next {
    Chunk(Result<Bytes, reqwest::Error>),
    End,
    Idle,
    Killed,
}

/// Chunks pass through untouched. The stream owns the gate permit and the
/// completion guard, so both are released when the body is done or dropped.
/// Going `timeout_secs` without a chunk fails the call.
fn relay_stream(
    response: reqwest::Response,
    extract: FragmentFn,
    mut guard: CompletionGuard,
    permit: GatePermit,
    cancel: CancellationToken,
    timeout_secs: u64,
) -> impl futures::Stream<Item = Result<Bytes, ProxyError>> + Send {
    async_stream::stream! {
        let _permit = permit;
        let mut upstream = response.bytes_stream();
        let mut preview = NdjsonPreview::new(extract);
        let idle = Duration::from_secs(timeout_secs);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Next::Killed,
                chunk = tokio::time::timeout(idle, upstream.next()) => match chunk {
                    Ok(Some(chunk)) => Next::Chunk(chunk),
                    Ok(None) => Next::End,
                    Err(_) => Next::Idle,
                },
            };

            match next {
                Next::Chunk(Ok(bytes)) => {
                    preview.feed(&bytes);
                    yield Ok(bytes);
                }
                Next::Chunk(Err(e)) => {
                    let err = ProxyError::from_reqwest(e, timeout_secs);
                    tracing::warn!(error = %err, "Backend stream broke");
                    guard.fail(&err);
                    yield Err(err);
                    break;
                }
                Next::Idle => {
                    let err = ProxyError::Timeout(timeout_secs);
                    tracing::warn!(error = %err, "Backend stream went quiet");
                    guard.fail(&err);
                    yield Err(err);
                    break;
                }
                Next::End => {
                    guard.complete(Some(preview.finish()));
                    break;
                }
                Next::Killed => {
                    // the tracker already recorded the kill
                    yield Err(ProxyError::Killed);
                    break;
                }
            }
        }
    }
}

fn relay_response(status: StatusCode, content_type: Option<HeaderValue>, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}
