/// Retrieval-free chat handler, the client router's fallback
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::admit;
use super::elapsed_ms;
use super::parse_chat_request;
use super::release_on_failure;
use super::AppState;
use crate::api::error::ApiError;
use crate::api::types::ChatRequest;
use crate::api::types::SimpleChatResponse;
use crate::api::types::SimpleMetadata;

/// POST /api/chat/simple
pub async fn simple_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<SimpleChatResponse>, ApiError> {
    let started = Instant::now();
    let (message, request) = parse_chat_request(payload)?;
    info!("POST /api/chat/simple: {message}");

    let admitted_at = admit(&state)?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let answer = state
        .rag
        .simple_answer(&message, &request.conversation_history, &cancel)
        .await
        .inspect_err(|_| release_on_failure(&state, admitted_at))?;

    Ok(Json(SimpleChatResponse {
        message: answer,
        metadata: SimpleMetadata {
            processing_time: elapsed_ms(started),
            cached: false,
        },
    }))
}
