/// API request handlers
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::info;

use crate::api::cache::ResponseCache;
use crate::api::error::ApiError;
use crate::api::rate_limit::Admission;
use crate::api::rate_limit::RateLimiter;
use crate::api::rate_limit::RetryAfter;
use crate::api::types::ChatRequest;
use crate::api::types::HealthFeatures;
use crate::api::types::HealthResponse;
use crate::api::types::KnowledgeBaseInfo;
use crate::api::types::LimitInfo;
use crate::api::types::RagChatResponse;
use crate::api::types::TieredChatResponse;
use crate::config::AppConfig;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::QueryEmbedder;
use crate::errors::Result;
use crate::knowledge::KnowledgeStore;
use crate::llm::GeminiClient;
use crate::llm::LanguageModel;
use crate::rag::DocumentStore;
use crate::rag::RagService;
use crate::rag::TieredAnswerer;

pub mod chat;
pub mod simple;
pub mod tiered;
pub mod usage;

pub use chat::chat;
pub use simple::simple_chat;
pub use tiered::tiered_chat;
pub use usage::usage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub rag: Arc<RagService>,
    pub tiered: Arc<TieredAnswerer>,
    pub rag_cache: Arc<ResponseCache<RagChatResponse>>,
    pub tiered_cache: Arc<ResponseCache<TieredChatResponse>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub embeddings_enabled: bool,
}

impl AppState {
    /// Assemble state from already-built services
    pub fn new(
        config: AppConfig,
        knowledge: KnowledgeStore,
        documents: Arc<DocumentStore>,
        model: Arc<dyn LanguageModel>,
        embedder: Option<Arc<dyn QueryEmbedder>>,
        rate_limiter: RateLimiter,
    ) -> Self {
        let embeddings_enabled = embedder.is_some() && knowledge.has_embeddings();
        let rag = RagService::new(knowledge, embedder, model.clone(), &config);
        let tiered = TieredAnswerer::standard(model, documents, &config);

        Self {
            rag_cache: Arc::new(ResponseCache::new(&config.cache)),
            tiered_cache: Arc::new(ResponseCache::new(&config.cache)),
            rate_limiter: Arc::new(rate_limiter),
            rag: Arc::new(rag),
            tiered: Arc::new(tiered),
            config: Arc::new(config),
            embeddings_enabled,
        }
    }

    /// Load the knowledge base and connect to the model provider
    ///
    /// # Errors
    /// - Knowledge base file missing or malformed
    /// - HTTP client build errors
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let knowledge = KnowledgeStore::load(&config.knowledge.knowledge_base_path).await?;
        let documents = Arc::new(DocumentStore::new(&config.knowledge.documents_path));
        let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(&config.llm)?);
        let embedder: Arc<dyn QueryEmbedder> = Arc::new(EmbeddingClient::new(&config.llm)?);
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());

        Ok(Self::new(
            config,
            knowledge,
            documents,
            model,
            Some(embedder),
            rate_limiter,
        ))
    }
}

impl AppState {
    /// Drop expired entries from both response caches
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.rag_cache.cleanup_expired(now) + self.tiered_cache.cleanup_expired(now)
    }
}

/// Parse the body and require a non-blank message
pub(crate) fn parse_chat_request(
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<(String, ChatRequest), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let message = request
        .message()
        .ok_or_else(|| ApiError::BadRequest("Message is required".to_string()))?
        .to_string();
    Ok((message, request))
}

/// Check quota and throttle, counting the request when admitted
///
/// Returns the admission time for [`release_on_failure`].
pub(crate) fn admit(state: &AppState) -> std::result::Result<DateTime<Utc>, ApiError> {
    let now = Utc::now();
    match state.rate_limiter.try_acquire_at(now) {
        Admission::Admitted(remaining) => {
            debug!(
                "Request admitted ({} left today, {} this minute)",
                remaining.today, remaining.this_minute
            );
            Ok(now)
        }
        Admission::Denied {
            reason,
            retry_after,
        } => {
            info!("Request denied: {}", reason.code());
            Err(ApiError::RateLimited {
                error: reason.code().to_string(),
                message: reason.message().to_string(),
                retry_after,
            })
        }
        Admission::Throttled { wait_time_ms } => Err(ApiError::RateLimited {
            error: "throttled".to_string(),
            message: "Please wait a moment before sending another message.".to_string(),
            retry_after: RetryAfter::Seconds(wait_time_ms.div_ceil(1000)),
        }),
    }
}

/// A request that failed upstream leaves the throttle free, so the client's
/// immediate retry on the simple endpoint is admitted.
pub(crate) fn release_on_failure(state: &AppState, admitted_at: DateTime<Utc>) {
    state.rate_limiter.release_throttle_at(admitted_at);
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let kb = state.rag.knowledge().knowledge_base();
    let config = &state.config;

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        university: config.assistant.university_name.clone(),
        model: config.llm_model().to_string(),
        features: HealthFeatures {
            rag: true,
            tiered: true,
            web_search: true,
            embeddings: state.embeddings_enabled,
            response_cache: true,
        },
        knowledge_base: KnowledgeBaseInfo {
            version: kb.version.clone(),
            chunks: kb.chunks.len(),
            embedded_chunks: kb.embedded_count(),
            categories: kb.categories.iter().cloned().collect(),
        },
        limits: LimitInfo {
            requests_per_minute: config.rate_limit.requests_per_minute,
            requests_per_day: config.rate_limit.requests_per_day,
            min_interval_ms: config.rate_limit.min_interval_ms,
            cache_ttl_secs: config.cache.ttl_secs,
        },
    })
}
