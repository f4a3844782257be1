/// Usage and quota handler
use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::api::cache::CacheStats;
use crate::api::types::UsageResponse;

/// GET /api/usage
pub async fn usage(State(state): State<AppState>) -> Json<UsageResponse> {
    let rag = state.rag_cache.stats();
    let tiered = state.tiered_cache.stats();

    Json(UsageResponse {
        usage: state.rate_limiter.usage(),
        cache: CacheStats {
            hits: rag.hits + tiered.hits,
            misses: rag.misses + tiered.misses,
            entries: rag.entries + tiered.entries,
        },
    })
}
