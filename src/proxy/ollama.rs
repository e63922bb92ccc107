//! Ollama routes: which calls are tracked and how they are described.

use axum::http::Method;
use serde_json::{json, Value};

use crate::tracker::{Metadata, TrackedRequest};

pub const SERVICE: &str = "ollama";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OllamaRoute {
    Generate,
    Chat,
    Passthrough,
}

impl OllamaRoute {
    /// Classify a call by method and the path below `/ollama/`.
    pub fn classify(method: &Method, path: &str) -> Self {
        if method != Method::POST {
            return OllamaRoute::Passthrough;
        }
        match path.trim_matches('/') {
            "api/generate" => OllamaRoute::Generate,
            "api/chat" => OllamaRoute::Chat,
            _ => OllamaRoute::Passthrough,
        }
    }
}

fn model_of(body: &Value) -> &str {
    body.get("model").and_then(Value::as_str).unwrap_or("unknown")
}

fn stream_flag(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(true)
}

/// Describe a `POST /api/generate` call.
pub fn generate_request(body: &Value) -> TrackedRequest {
    let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or("");

    let mut metadata = Metadata::new();
    metadata.insert("full_prompt_length".into(), json!(prompt.chars().count()));
    metadata.insert("stream".into(), json!(stream_flag(body)));
    metadata.insert(
        "options".into(),
        body.get("options").cloned().unwrap_or_else(|| json!({})),
    );

    TrackedRequest::new(SERVICE, model_of(body), prompt).with_metadata(metadata)
}

/// Describe a `POST /api/chat` call. The prompt is the last message.
pub fn chat_request(body: &Value) -> TrackedRequest {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let last = messages
        .last()
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("");

    let mut metadata = Metadata::new();
    metadata.insert("message_count".into(), json!(messages.len()));
    metadata.insert("stream".into(), json!(stream_flag(body)));

    TrackedRequest::new(SERVICE, model_of(body), last).with_metadata(metadata)
}

/// Text fragment of one `/api/generate` stream record.
pub fn generate_fragment(record: &Value) -> Option<&str> {
    record.get("response").and_then(Value::as_str)
}

/// Text fragment of one `/api/chat` stream record.
pub fn chat_fragment(record: &Value) -> Option<&str> {
    record
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
}
