//! End-to-end tests of the tracked and passthrough proxy paths against mock backends.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use std::time::Duration;
use tower::Service;
use turnstile::tracker::RequestStatus;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_owned(), "application/x-ndjson")
}

#[tokio::test]
async fn test_generate_streams_reply_and_records_preview() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({"model": "llama2", "prompt": "hi"})))
        .respond_with(ndjson(common::GENERATE_STREAM))
        .expect(1)
        .mount(&ollama)
        .await;

    let (mut app, state) = common::make_app(common::make_config(&ollama.uri(), common::UNREACHABLE_URL));
    let request = common::json_request(
        "POST",
        "/ollama/api/generate",
        json!({"model": "llama2", "prompt": "hi"}),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/x-ndjson"
    );
    let body = common::body_to_string(response.into_body()).await;
    assert_eq!(body, common::GENERATE_STREAM);

    let history = state.tracker.history(10);
    assert_eq!(history.len(), 1);
    let done = &history[0];
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.service, "ollama");
    assert_eq!(done.model, "llama2");
    assert_eq!(done.prompt_preview, "hi");
    assert_eq!(done.response_preview.as_deref(), Some("hello"));
    assert_eq!(done.metadata["stream"], true);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.unwrap() >= done.started_at.unwrap());

    assert_eq!(state.tracker.stats().completed_count, 1);
    assert_eq!(state.ollama.gate().available(), 1);
}

#[tokio::test]
async fn test_chat_preview_uses_message_content() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(common::CHAT_STREAM))
        .mount(&ollama)
        .await;

    let (mut app, state) = common::make_app(common::make_config(&ollama.uri(), common::UNREACHABLE_URL));
    let request = common::json_request(
        "POST",
        "/ollama/api/chat",
        json!({
            "model": "mistral",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "say hello"}
            ]
        }),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    common::body_to_string(response.into_body()).await;

    let done = &state.tracker.history(1)[0];
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.prompt_preview, "say hello");
    assert_eq!(done.metadata["message_count"], 2);
    assert_eq!(done.response_preview.as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_backend_error_is_relayed_and_recorded_as_failed() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&ollama)
        .await;

    let (mut app, state) = common::make_app(common::make_config(&ollama.uri(), common::UNREACHABLE_URL));
    let request = common::json_request(
        "POST",
        "/ollama/api/generate",
        json!({"model": "llama2", "prompt": "hi"}),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::body_to_string(response.into_body()).await;
    assert_eq!(body, "model not loaded");

    let failed = &state.tracker.history(1)[0];
    assert_eq!(failed.status, RequestStatus::Failed);
    assert_eq!(
        failed.error.as_deref(),
        Some("backend returned 500: model not loaded")
    );
    assert!(failed.response_preview.is_none());
    assert_eq!(state.ollama.gate().available(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_returns_bad_gateway() {
    let (mut app, state) = common::make_offline_app();
    let request = common::json_request(
        "POST",
        "/ollama/api/generate",
        json!({"model": "llama2", "prompt": "hi"}),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = common::body_to_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "bad_gateway");

    let failed = &state.tracker.history(1)[0];
    assert_eq!(failed.status, RequestStatus::Failed);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .starts_with("connection to backend failed"));
    assert_eq!(state.tracker.stats().failed_count, 1);
    assert_eq!(state.ollama.gate().available(), 1);
}

#[tokio::test]
async fn test_invalid_json_is_rejected_before_admission() {
    let (mut app, state) = common::make_offline_app();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/ollama/api/generate")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = common::body_to_json(response.into_body()).await;
    assert_eq!(json["error"]["type"], "invalid_request_error");

    let request = common::json_request("POST", "/qdrant/collections/docs/points/search", json!([1, 2]));
    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.tracker.stats(), Default::default());
    assert!(state.tracker.history(10).is_empty());
}

#[tokio::test]
async fn test_untracked_calls_pass_through() {
    let ollama = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .expect(1)
        .mount(&ollama)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1]})))
        .expect(1)
        .mount(&ollama)
        .await;

    let (mut app, state) = common::make_app(common::make_config(&ollama.uri(), common::UNREACHABLE_URL));

    let response = app
        .call(common::empty_request("GET", "/ollama/api/tags"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_to_json(response.into_body()).await;
    assert_eq!(json, json!({"models": []}));

    let request = common::json_request(
        "POST",
        "/ollama/api/embeddings",
        json!({"model": "nomic", "prompt": "x"}),
    );
    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.tracker.stats(), Default::default());
}

#[tokio::test]
async fn test_passthrough_forwards_query_and_status() {
    let qdrant = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(query_param("verbose", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"collections": []}})))
        .mount(&qdrant)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&qdrant)
        .await;

    let (mut app, state) = common::make_app(common::make_config(common::UNREACHABLE_URL, &qdrant.uri()));

    let response = app
        .call(common::empty_request("GET", "/qdrant/collections?verbose=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .call(common::empty_request("GET", "/qdrant/collections/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(common::body_to_string(response.into_body()).await, "Not found");

    assert!(state.tracker.history(10).is_empty());
}

#[tokio::test]
async fn test_passthrough_to_unreachable_backend() {
    let (mut app, state) = common::make_offline_app();
    let response = app
        .call(common::empty_request("GET", "/qdrant/collections"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(state.tracker.history(10).is_empty());
}

#[tokio::test]
async fn test_qdrant_search_records_hit_count() {
    let qdrant = MockServer::start().await;
    let reply = json!({
        "result": [{"id": 1, "score": 0.9}, {"id": 2, "score": 0.8}],
        "status": "ok",
        "time": 0.001
    });
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply.clone()))
        .mount(&qdrant)
        .await;

    let (mut app, state) = common::make_app(common::make_config(common::UNREACHABLE_URL, &qdrant.uri()));
    let request = common::json_request(
        "POST",
        "/qdrant/collections/docs/points/search",
        json!({"vector": [0.1, 0.2], "limit": 5}),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_to_json(response.into_body()).await, reply);

    let done = &state.tracker.history(1)[0];
    assert_eq!(done.service, "qdrant");
    assert_eq!(done.model, "docs");
    assert_eq!(done.prompt_preview, "search (limit=5)");
    assert_eq!(done.response_preview.as_deref(), Some("2 points found"));
    assert_eq!(done.metadata["operation"], "search");
    assert_eq!(state.qdrant.gate().available(), 1);
}

#[tokio::test]
async fn test_qdrant_upsert_records_point_count() {
    let qdrant = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs/points"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": {"status": "acknowledged"}, "status": "ok"})),
        )
        .mount(&qdrant)
        .await;

    let (mut app, state) = common::make_app(common::make_config(common::UNREACHABLE_URL, &qdrant.uri()));
    let request = common::json_request(
        "PUT",
        "/qdrant/collections/docs/points",
        json!({"points": [
            {"id": 1, "vector": [0.1]},
            {"id": 2, "vector": [0.2]},
            {"id": 3, "vector": [0.3]}
        ]}),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let done = &state.tracker.history(1)[0];
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.prompt_preview, "upsert (3 points)");
    assert_eq!(done.response_preview.as_deref(), Some("upserted 3 points"));
    assert_eq!(done.metadata["points_count"], 3);
}

#[tokio::test]
async fn test_qdrant_upsert_backend_error() {
    let qdrant = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs/points"))
        .respond_with(ResponseTemplate::new(400).set_body_string("wrong vector size"))
        .mount(&qdrant)
        .await;

    let (mut app, state) = common::make_app(common::make_config(common::UNREACHABLE_URL, &qdrant.uri()));
    let request = common::json_request(
        "PUT",
        "/qdrant/collections/docs/points",
        json!({"points": [{"id": 1, "vector": [0.1]}]}),
    );

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let failed = &state.tracker.history(1)[0];
    assert_eq!(failed.status, RequestStatus::Failed);
    assert_eq!(
        failed.error.as_deref(),
        Some("backend returned 400: wrong vector size")
    );
}

#[tokio::test]
async fn test_stream_outlives_backend_timeout_while_it_progresses() {
    let records: Vec<String> = (0..8)
        .map(|i| format!("{{\"response\":\"{}\",\"done\":{}}}\n", i, i == 7))
        .collect();
    let expected_body = records.concat();
    let backend = axum::Router::new().route(
        "/api/generate",
        axum::routing::post(move || {
            let records = records.clone();
            async move { common::paced_ndjson(records, Duration::from_millis(300)) }
        }),
    );
    let ollama_url = common::spawn_backend(backend).await;

    let mut config = common::make_config(&ollama_url, common::UNREACHABLE_URL);
    config.backends.ollama.timeout_seconds = 1;
    let (mut app, state) = common::make_app(config);

    let response = app
        .call(common::json_request(
            "POST",
            "/ollama/api/generate",
            json!({"model": "llama2", "prompt": "count"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let (body, errored) = common::body_until_error(response.into_body()).await;
    assert!(!errored);
    assert_eq!(body, expected_body);

    let done = &state.tracker.history(1)[0];
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.response_preview.as_deref(), Some("01234567"));
}

#[tokio::test]
async fn test_stream_that_goes_quiet_times_out() {
    let backend = axum::Router::new().route(
        "/api/generate",
        axum::routing::post(|| async {
            common::paced_ndjson(
                vec![
                    "{\"response\":\"hel\",\"done\":false}\n".to_string(),
                    "{\"response\":\"lo\",\"done\":true}\n".to_string(),
                ],
                Duration::from_secs(3),
            )
        }),
    );
    let ollama_url = common::spawn_backend(backend).await;

    let mut config = common::make_config(&ollama_url, common::UNREACHABLE_URL);
    config.backends.ollama.timeout_seconds = 1;
    let (mut app, state) = common::make_app(config);

    let response = app
        .call(common::json_request(
            "POST",
            "/ollama/api/generate",
            json!({"model": "llama2", "prompt": "hi"}),
        ))
        .await
        .unwrap();
    let (body, errored) = common::body_until_error(response.into_body()).await;
    assert!(errored);
    assert_eq!(body, "{\"response\":\"hel\",\"done\":false}\n");

    let failed = &state.tracker.history(1)[0];
    assert_eq!(failed.status, RequestStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("backend timed out after 1s"));
    assert_eq!(state.ollama.gate().available(), 1);
}

#[tokio::test]
async fn test_backend_failure_mid_stream_is_recorded() {
    let backend = axum::Router::new().route(
        "/api/generate",
        axum::routing::post(|| async {
            common::broken_reply(200, "{\"response\":\"hel\",\"done\":false}\n")
        }),
    );
    let ollama_url = common::spawn_backend(backend).await;
    let (mut app, state) = common::make_app(common::make_config(&ollama_url, common::UNREACHABLE_URL));

    let response = app
        .call(common::json_request(
            "POST",
            "/ollama/api/generate",
            json!({"model": "llama2", "prompt": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let (body, errored) = common::body_until_error(response.into_body()).await;
    assert!(errored);
    assert_eq!(body, "{\"response\":\"hel\",\"done\":false}\n");

    let failed = &state.tracker.history(1)[0];
    assert_eq!(failed.status, RequestStatus::Failed);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .starts_with("backend stream failed"));
    assert!(failed.response_preview.is_none());
    assert_eq!(state.ollama.gate().available(), 1);
}

#[tokio::test]
async fn test_unreadable_error_reply_fails_the_call() {
    let backend = axum::Router::new().route(
        "/api/generate",
        axum::routing::post(|| async { common::broken_reply(500, "model not") }),
    );
    let ollama_url = common::spawn_backend(backend).await;
    let (mut app, state) = common::make_app(common::make_config(&ollama_url, common::UNREACHABLE_URL));

    let response = app
        .call(common::json_request(
            "POST",
            "/ollama/api/generate",
            json!({"model": "llama2", "prompt": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let failed = &state.tracker.history(1)[0];
    assert_eq!(failed.status, RequestStatus::Failed);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .starts_with("backend stream failed"));
}

#[tokio::test]
async fn test_malformed_ndjson_line_is_relayed_but_not_previewed() {
    let reply = "{\"response\":\"hel\",\"done\":false}\nnot json at all\n{\"response\":\"lo\",\"done\":true}\n";
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ndjson(reply))
        .mount(&ollama)
        .await;

    let (mut app, state) = common::make_app(common::make_config(&ollama.uri(), common::UNREACHABLE_URL));
    let response = app
        .call(common::json_request(
            "POST",
            "/ollama/api/generate",
            json!({"model": "llama2", "prompt": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(common::body_to_string(response.into_body()).await, reply);

    let done = &state.tracker.history(1)[0];
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.response_preview.as_deref(), Some("hello"));
}
