mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::Router;
use campusrag::api::build_router;
use campusrag::api::rate_limit::RateLimiter;
use campusrag::api::AppState;
use campusrag::knowledge::KnowledgeStore;
use campusrag::llm::Generation;
use campusrag::rag::documents::DocumentChunk;
use campusrag::rag::DocumentStore;
use campusrag::AppConfig;
use chrono::Duration;
use chrono::Utc;
use common::data_path;
use common::test_config;
use common::upstream;
use common::ScriptedModel;
use serde_json::json;
use serde_json::Value;
use tower::ServiceExt;

async fn state_with(config: AppConfig, model: Arc<ScriptedModel>) -> AppState {
    let knowledge = KnowledgeStore::load(data_path("knowledge_base.json"))
        .await
        .unwrap();
    let documents = Arc::new(DocumentStore::from_documents(vec![DocumentChunk {
        id: "handbook-1".to_string(),
        source: "uploads/student_handbook.pdf".to_string(),
        text: "Students may drop a course until the end of the sixth week.".to_string(),
    }]));
    let rate_limiter = RateLimiter::in_memory(config.rate_limit.clone());
    AppState::new(config, knowledge, documents, model, None, rate_limiter)
}

async fn app_with(config: AppConfig, model: Arc<ScriptedModel>) -> Router {
    build_router(state_with(config, model).await, false)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_reports_knowledge_base() {
    let app = app_with(test_config(), ScriptedModel::new(Vec::new())).await;

    let (status, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "campusrag");
    assert_eq!(body["knowledgeBase"]["chunks"], 4);
    assert_eq!(body["features"]["embeddings"], false);
    assert_eq!(body["limits"]["requestsPerDay"], 1500);
}

#[tokio::test]
async fn test_missing_or_blank_message_is_rejected() {
    let model = ScriptedModel::new(Vec::new());
    let app = app_with(test_config(), model.clone()).await;

    for body in [json!({}), json!({"message": "   "}), json!({"message": null})] {
        let (status, json) = send(&app, "POST", "/api/chat", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_request");
    }

    let (status, _) = send(&app, "POST", "/api/chat/tiered", Some(json!({"message": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = app_with(test_config(), ScriptedModel::new(Vec::new())).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_answer_is_cached_case_insensitively() {
    let model = ScriptedModel::answering("Hinman is open 7:00 AM to 9:00 PM on weekdays.");
    let app = app_with(test_config(), model.clone()).await;

    let (status, first) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({"message": "Hinman dining hours?", "conversationHistory": []})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["metadata"]["cached"], false);
    assert_eq!(first["metadata"]["searchMethod"], "keyword");
    assert_eq!(first["metadata"]["usedFallback"], false);

    let (status, second) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({"message": "  HINMAN DINING HOURS?  "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["metadata"]["cached"], true);
    assert_eq!(second["message"], first["message"]);
    assert_eq!(model.call_count(), 1);

    // Cache hits do not consume quota
    let (_, usage) = send(&app, "GET", "/api/usage", None).await;
    assert_eq!(usage["today"]["used"], 1);
    assert_eq!(usage["cache"]["hits"], 1);
}

#[tokio::test]
async fn test_daily_limit_returns_429() {
    let mut config = test_config();
    config.rate_limit.requests_per_day = 1;
    let app = app_with(config, ScriptedModel::new(Vec::new())).await;

    let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"message": "Hinman hours"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/tiered",
        Some(json!({"message": "CS 515 location"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "daily_limit_exceeded");
    assert_eq!(body["rateLimited"], true);
    assert_eq!(body["retryAfter"], "tomorrow");
}

#[tokio::test]
async fn test_throttle_between_requests() {
    let mut config = test_config();
    config.rate_limit.min_interval_ms = 60_000;
    let app = app_with(config, ScriptedModel::new(Vec::new())).await;

    let (status, _) = send(&app, "POST", "/api/chat/simple", Some(json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/chat/simple", Some(json!({"message": "hello"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "throttled");
    assert!(body["retryAfter"].as_u64().unwrap() >= 59);
}

#[tokio::test]
async fn test_simple_retry_after_failed_chat_is_not_throttled() {
    let mut config = test_config();
    config.rate_limit.min_interval_ms = 1000;
    let model = ScriptedModel::new(vec![
        Err(upstream(500, "internal failure")),
        Ok(Generation::text("Hinman opens at 7:00 AM.")),
    ]);
    let app = app_with(config, model).await;

    let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"message": "Hinman dining hours?"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/simple",
        Some(json!({"message": "Hinman dining hours?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Hinman opens at 7:00 AM.");

    // the successful retry holds the throttle again
    let (status, body) = send(&app, "POST", "/api/chat/simple", Some(json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "throttled");

    let (_, usage) = send(&app, "GET", "/api/usage", None).await;
    assert_eq!(usage["today"]["used"], 2);
}

#[tokio::test]
async fn test_tiered_answer_from_documents() {
    let model = ScriptedModel::answering("You can drop until the end of week six.");
    let app = app_with(test_config(), model).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/tiered",
        Some(json!({"message": "When can I drop a course?"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["tier"], 1);
    assert_eq!(body["metadata"]["tierName"], "internal_documents");
    assert_eq!(body["metadata"]["internalDocsUsed"], true);
    assert_eq!(body["metadata"]["sources"], json!(["student handbook"]));
    assert_eq!(body["metadata"]["chunksUsed"], 1);
    assert!(body["metadata"].get("failureReasons").is_none());
}

#[tokio::test]
async fn test_tiered_quota_error_maps_to_429() {
    let model = ScriptedModel::new(vec![
        Err(upstream(429, "RESOURCE_EXHAUSTED")),
        Err(upstream(429, "RESOURCE_EXHAUSTED")),
        Err(upstream(429, "RESOURCE_EXHAUSTED")),
    ]);
    let app = app_with(test_config(), model).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/tiered",
        Some(json!({"message": "When can I drop a course?"})),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["retryAfter"], 60);
}

#[tokio::test]
async fn test_tiered_fallback_is_not_cached() {
    let model = ScriptedModel::new(vec![
        Err(upstream(500, "INTERNAL: backend error")),
        Err(upstream(500, "INTERNAL: backend error")),
        Err(upstream(500, "INTERNAL: backend error")),
        Ok(Generation::text("Drop deadline is week six.")),
    ]);
    let app = app_with(test_config(), model.clone()).await;
    let request = json!({"message": "When can I drop a course?"});

    let (status, body) = send(&app, "POST", "/api/chat/tiered", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["tier"], 0);
    assert_eq!(body["metadata"]["tierName"], "fallback");
    assert_eq!(body["metadata"]["failureReasons"][0]["reason"], "error");

    let (status, body) = send(&app, "POST", "/api/chat/tiered", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["tier"], 1);
    assert_eq!(body["metadata"]["cached"], false);
    assert_eq!(model.call_count(), 4);
}

#[tokio::test]
async fn test_auth_error_hides_detail() {
    let model = ScriptedModel::new(vec![Err(upstream(403, "API key not valid. Please pass a valid API key."))]);
    let app = app_with(test_config(), model).await;

    let (status, body) = send(&app, "POST", "/api/chat", Some(json!({"message": "Hinman hours"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "service_unavailable");
    assert!(!body["message"].as_str().unwrap().contains("API key"));
}

#[tokio::test]
async fn test_usage_endpoint_shape() {
    let app = app_with(test_config(), ScriptedModel::new(Vec::new())).await;

    let (status, body) = send(&app, "GET", "/api/usage", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["today"]["used"], 0);
    assert_eq!(body["today"]["limit"], 1500);
    assert_eq!(body["thisMinute"]["limit"], 15);
    assert_eq!(body["warnings"]["nearDailyLimit"], false);
    assert_eq!(body["persistent"], false);
    assert_eq!(body["cache"]["entries"], 0);
}

#[tokio::test]
async fn test_sweep_evicts_expired_responses() {
    let state = state_with(test_config(), ScriptedModel::answering("Hinman opens at 7:00 AM.")).await;
    let app = build_router(state.clone(), false);

    let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"message": "Hinman hours"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.sweep_expired_at(Utc::now()), 0);

    let ttl = Duration::seconds(i64::try_from(state.config.cache.ttl_secs).unwrap());
    assert_eq!(state.sweep_expired_at(Utc::now() + ttl + Duration::seconds(1)), 1);

    let (_, usage) = send(&app, "GET", "/api/usage", None).await;
    assert_eq!(usage["cache"]["entries"], 0);
}
