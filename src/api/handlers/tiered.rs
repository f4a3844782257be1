/// Three-tier chat handler
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
use crate::api::types::TieredChatResponse;
use crate::api::types::TieredMetadata;
use crate::errors::UpstreamErrorKind;
use crate::rag::tiered::TierRequest;
use crate::rag::tiered::TieredResponse;

/// POST /api/chat/tiered
pub async fn tiered_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<TieredChatResponse>, ApiError> {
    let started = Instant::now();
    let (message, request) = parse_chat_request(payload)?;
    let request_id = Uuid::new_v4();

    respond(state, message, request, started)
        .instrument(tracing::info_span!("tiered_chat", %request_id))
        .await
}

async fn respond(
    state: AppState,
    message: String,
    request: ChatRequest,
    started: Instant,
) -> Result<Json<TieredChatResponse>, ApiError> {
    info!("POST /api/chat/tiered: {message}");

    if let Some(hit) = state.tiered_cache.get(&message) {
        let mut response = hit.value;
        response.metadata.cached = true;
        response.metadata.processing_time = elapsed_ms(started);
        return Ok(Json(response));
    }

    let admitted_at = admit(&state)?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let tier_request = TierRequest::new(message.clone(), request.conversation_history);
    let mut result = state
        .tiered
        .answer(&tier_request, &cancel)
        .await
        .inspect_err(|_| release_on_failure(&state, admitted_at))?;

    if result.is_fallback() {
        // An exhausted cascade surfaces quota, auth and safety problems
        // as errors; anything else gets the apology.
        if let Some(err) = result.last_error.take() {
            if err.upstream_kind() != UpstreamErrorKind::Other {
                release_on_failure(&state, admitted_at);
                return Err(ApiError::Upstream(err));
            }
        }
    }

    let response = to_response(result, elapsed_ms(started));
    if response.metadata.tier != 0 && !cancel.is_cancelled() {
        state.tiered_cache.put(&message, response.clone());
    }

    info!(
        "Answered by tier {} ({}) in {}ms",
        response.metadata.tier, response.metadata.tier_name, response.metadata.processing_time
    );
    Ok(Json(response))
}

fn to_response(result: TieredResponse, processing_time: u64) -> TieredChatResponse {
    let (internal_docs_used, google_search_used, sources, chunks_used) = match result.answer {
        Some(answer) => (
            answer.internal_docs_used.then_some(true),
            answer.google_search_used.then_some(true),
            (!answer.sources.is_empty()).then_some(answer.sources),
            answer.chunks_used,
        ),
        None => (None, None, None, None),
    };

    TieredChatResponse {
        message: result.message,
        metadata: TieredMetadata {
            tier: result.tier,
            tier_name: result.tier_name,
            internal_docs_used,
            google_search_used,
            sources,
            chunks_used,
            cached: false,
            processing_time,
            failure_reasons: result.failures,
        },
    }
}
