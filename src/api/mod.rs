//! # HTTP surface
//!
//! Read-only views of the tracker, kill-by-id, the live control channel, and
//! the two backend proxies.
//!
//! ## Endpoints
//!
//! - `GET /api/queue`, `GET /api/processing`, `GET /api/history?limit=N`, `GET /api/stats`
//! - `POST /api/kill/:id` - Kill a queued or in-flight request
//! - `GET /ws` - Snapshot stream plus inbound kill commands
//! - `GET /health`, `GET /metrics`
//! - `/ollama/*path`, `/qdrant/*path` - Proxied backends
//! - `POST /api/test/{add,process/:id,complete/:id}` - Only with `server.enable_test_endpoints`
//!
//! ## Example
//!
//! ```no_run
//! use turnstile::api::{create_router, AppState};
//! use turnstile::config::TurnstileConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = Arc::new(AppState::new(Arc::new(TurnstileConfig::default()))?);
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod backends;
mod health;
mod requests;
pub mod types;
mod websocket;

pub use types::*;

use crate::config::TurnstileConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::{ollama, qdrant, ProxyAdapter};
use crate::tracker::Tracker;
use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (10 MB).
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: Arc<TurnstileConfig>,
    pub tracker: Arc<Tracker>,
    pub ollama: ProxyAdapter,
    pub qdrant: ProxyAdapter,
    /// Server startup time for uptime tracking
    pub start_time: Instant,
    pub metrics_collector: Arc<MetricsCollector>,
}

impl AppState {
    /// Build the tracker, the HTTP client and both proxies from configuration.
    pub fn new(config: Arc<TurnstileConfig>) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()?;

        // The recorder must exist before the gates report their first value.
        let prometheus_handle = crate::metrics::handle_or_detached();

        let tracker = Arc::new(Tracker::new(&config.tracker));
        let passthrough_timeout = config.server.passthrough_timeout_seconds;

        let ollama = ProxyAdapter::new(
            ollama::SERVICE,
            &config.backends.ollama,
            passthrough_timeout,
            http_client.clone(),
            Arc::clone(&tracker),
        );
        let qdrant = ProxyAdapter::new(
            qdrant::SERVICE,
            &config.backends.qdrant,
            passthrough_timeout,
            http_client,
            Arc::clone(&tracker),
        );

        let start_time = Instant::now();
        let metrics_collector = Arc::new(MetricsCollector::new(
            Arc::clone(&tracker),
            start_time,
            prometheus_handle,
        ));

        Ok(Self {
            config,
            tracker,
            ollama,
            qdrant,
            start_time,
            metrics_collector,
        })
    }
}

/// Create the main API router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/queue", get(requests::queue))
        .route("/api/processing", get(requests::processing))
        .route("/api/history", get(requests::history))
        .route("/api/stats", get(requests::stats))
        .route("/api/kill/:id", post(requests::kill))
        .route("/ws", get(websocket::websocket_handler))
        .route("/health", get(health::handle))
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .route("/ollama/*path", any(backends::ollama))
        .route("/qdrant/*path", any(backends::qdrant));

    if state.config.server.enable_test_endpoints {
        router = router
            .route("/api/test/add", post(requests::test_add))
            .route("/api/test/process/:id", post(requests::test_process))
            .route("/api/test/complete/:id", post(requests::test_complete));
    }

    router
        .layer(TraceLayer::new_for_http().make_span_with(crate::logging::middleware::http_span))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}
