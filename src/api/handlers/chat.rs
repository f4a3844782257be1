/// RAG chat handler
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::Instrument;
use uuid::Uuid;

use super::admit;
use super::elapsed_ms;
use super::parse_chat_request;
use super::release_on_failure;
use super::AppState;
use crate::api::error::ApiError;
use crate::api::types::ChatRequest;
use crate::api::types::RagChatResponse;
use crate::api::types::RagMetadata;

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<RagChatResponse>, ApiError> {
    let started = Instant::now();
    let (message, request) = parse_chat_request(payload)?;
    let request_id = Uuid::new_v4();

    respond(state, message, request, started)
        .instrument(tracing::info_span!("chat", %request_id))
        .await
}

async fn respond(
    state: AppState,
    message: String,
    request: ChatRequest,
    started: Instant,
) -> Result<Json<RagChatResponse>, ApiError> {
    info!("POST /api/chat: {message}");

    if let Some(hit) = state.rag_cache.get(&message) {
        let mut response = hit.value;
        response.metadata.cached = true;
        response.metadata.processing_time = elapsed_ms(started);
        return Ok(Json(response));
    }

    let admitted_at = admit(&state)?;

    // Dropping the handler future cancels in-flight model calls
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let answer = state
        .rag
        .answer(&message, &request.conversation_history, &cancel)
        .await
        .inspect_err(|_| release_on_failure(&state, admitted_at))?;

    let response = RagChatResponse {
        message: answer.message,
        metadata: RagMetadata {
            chunks_found: answer.chunks_found,
            search_method: answer.search_method,
            processing_time: elapsed_ms(started),
            cached: false,
            used_fallback: answer.used_fallback,
            web_search_used: answer.web_search_used,
            sources: answer.sources,
        },
    };

    if !answer.used_fallback && !cancel.is_cancelled() {
        state.rag_cache.put(&message, response.clone());
    }

    info!(
        "Answered in {}ms ({} chunks, {:?})",
        response.metadata.processing_time,
        response.metadata.chunks_found,
        response.metadata.search_method
    );
    Ok(Json(response))
}
