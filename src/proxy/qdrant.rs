//! Qdrant routes: search and upsert are tracked, everything else passes through.

use axum::http::Method;
use serde_json::{json, Value};

use crate::tracker::{Metadata, TrackedRequest};

pub const SERVICE: &str = "qdrant";

/// Qdrant's own default for `limit` on search.
const DEFAULT_SEARCH_LIMIT: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QdrantRoute {
    Search { collection: String },
    Upsert { collection: String },
    Passthrough,
}

impl QdrantRoute {
    /// Classify a call by method and the path below `/qdrant/`.
    pub fn classify(method: &Method, path: &str) -> Self {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["collections", collection, "points", "search"]
                if *method == Method::POST && !collection.is_empty() =>
            {
                QdrantRoute::Search {
                    collection: collection.to_string(),
                }
            }
            ["collections", collection, "points"]
                if *method == Method::PUT && !collection.is_empty() =>
            {
                QdrantRoute::Upsert {
                    collection: collection.to_string(),
                }
            }
            _ => QdrantRoute::Passthrough,
        }
    }
}

/// Describe a points search. The collection stands in for the model.
pub fn search_request(collection: &str, body: &Value) -> TrackedRequest {
    let limit = body
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_SEARCH_LIMIT);
    let with_payload = body.get("with_payload").cloned().unwrap_or(Value::Bool(true));

    let mut metadata = Metadata::new();
    metadata.insert("operation".into(), json!("search"));
    metadata.insert("limit".into(), json!(limit));
    metadata.insert("with_payload".into(), with_payload);

    TrackedRequest::new(SERVICE, collection, &format!("search (limit={})", limit))
        .with_metadata(metadata)
}

/// Number of points carried by an upsert body.
pub fn points_count(body: &Value) -> usize {
    body.get("points").and_then(Value::as_array).map_or(0, Vec::len)
}

/// Describe a points upsert.
pub fn upsert_request(collection: &str, body: &Value) -> TrackedRequest {
    let count = points_count(body);

    let mut metadata = Metadata::new();
    metadata.insert("operation".into(), json!("upsert"));
    metadata.insert("points_count".into(), json!(count));

    TrackedRequest::new(SERVICE, collection, &format!("upsert ({} points)", count))
        .with_metadata(metadata)
}

/// Preview for a search reply: how many points came back.
pub fn search_summary(reply: &Value) -> String {
    let found = reply.get("result").and_then(Value::as_array).map_or(0, Vec::len);
    format!("{} points found", found)
}

pub fn upsert_summary(points: usize) -> String {
    format!("upserted {} points", points)
}
