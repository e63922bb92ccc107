//! `/ollama/*path` and `/qdrant/*path`.
//!
//! Each service has one catch-all route. The handler decides per call whether
//! it is tracked (and which relay applies) or passed straight through.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method},
    response::Response,
};
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::proxy::{
    ollama::{self, OllamaRoute},
    qdrant::{self, QdrantRoute},
    FragmentFn, ProxyError, Relay, TrackedCall,
};

fn parse_payload(body: &Bytes) -> Result<Value, ProxyError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| ProxyError::InvalidPayload(e.to_string()))?;
    if !payload.is_object() {
        return Err(ProxyError::InvalidPayload(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(payload)
}

/// Any method on `/ollama/*path`.
pub async fn ollama(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (request, extract): (_, FragmentFn) = match OllamaRoute::classify(&method, &path) {
        OllamaRoute::Generate => {
            let payload = parse_payload(&body)?;
            (ollama::generate_request(&payload), ollama::generate_fragment)
        }
        OllamaRoute::Chat => {
            let payload = parse_payload(&body)?;
            (ollama::chat_request(&payload), ollama::chat_fragment)
        }
        OllamaRoute::Passthrough => {
            let content_type = headers.get(CONTENT_TYPE).cloned();
            return Ok(state
                .ollama
                .passthrough(method, &path, query.as_deref(), content_type, body)
                .await?);
        }
    };

    let call = TrackedCall {
        request,
        method,
        path,
        query,
        body,
        relay: Relay::Stream(extract),
    };
    Ok(state.ollama.forward(call).await?)
}

/// Any method on `/qdrant/*path`.
pub async fn qdrant(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (request, relay) = match QdrantRoute::classify(&method, &path) {
        QdrantRoute::Search { collection } => {
            let payload = parse_payload(&body)?;
            let summarize = Box::new(|reply: &Value| qdrant::search_summary(reply));
            (qdrant::search_request(&collection, &payload), Relay::Buffered(summarize))
        }
        QdrantRoute::Upsert { collection } => {
            let payload = parse_payload(&body)?;
            let points = qdrant::points_count(&payload);
            let summarize = Box::new(move |_: &Value| qdrant::upsert_summary(points));
            (qdrant::upsert_request(&collection, &payload), Relay::Buffered(summarize))
        }
        QdrantRoute::Passthrough => {
            let content_type = headers.get(CONTENT_TYPE).cloned();
            return Ok(state
                .qdrant
                .passthrough(method, &path, query.as_deref(), content_type, body)
                .await?);
        }
    };

    let call = TrackedCall {
        request,
        method,
        path,
        query,
        body,
        relay,
    };
    Ok(state.qdrant.forward(call).await?)
}
