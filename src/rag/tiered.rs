//! Three-tier answering: internal documents, model knowledge, web search
//!
//! Each tier is a strategy returning a tagged success or failure. The driver
//! tries them strictly in order and stops at the first success. A tier that
//! errors is recorded as a failure and the cascade moves on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::llm::Generation;
use crate::llm::GenerationRequest;
use crate::llm::LanguageModel;
use crate::llm::RetryPolicy;
use crate::models::ConversationTurn;
use crate::rag::documents::format_document_context;
use crate::rag::documents::DocumentStore;
use crate::rag::prompts;

#[derive(Debug, Clone)]
pub struct TierRequest {
    pub message: String,
    pub history: Vec<ConversationTurn>,
}

impl TierRequest {
    pub fn new(message: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        Self {
            message: message.into(),
            history,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierAnswer {
    pub text: String,
    /// Document labels or cited URIs
    pub sources: Vec<String>,
    pub chunks_used: Option<usize>,
    pub internal_docs_used: bool,
    pub google_search_used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoDocuments,
    InsufficientContext,
    NeedsCurrentInfo,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Success(TierAnswer),
    Failure(FailureReason),
}

#[async_trait]
pub trait AnswerTier: Send + Sync {
    fn name(&self) -> &'static str;

    fn tier_number(&self) -> u8;

    /// Try to answer. `Err` is treated by the driver as [`FailureReason::Error`].
    async fn attempt(
        &self,
        request: &TierRequest,
        cancel: &CancellationToken,
    ) -> Result<TierOutcome>;
}

/// Model access shared by the standard tiers
#[derive(Clone)]
pub struct TierModel {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    university: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl TierModel {
    pub fn new(model: Arc<dyn LanguageModel>, config: &AppConfig) -> Self {
        Self {
            model,
            retry: RetryPolicy::from(&config.retry),
            university: config.assistant.university_name.clone(),
            temperature: config.llm.temperature,
            max_output_tokens: config.llm.max_output_tokens,
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn generate(
        &self,
        prompt: String,
        web_search: bool,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        let request = GenerationRequest {
            prompt,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            web_search,
        };
        self.retry.generate(self.model.as_ref(), &request, cancel).await
    }
}

/// Tier 1: answer strictly from the course-document corpus
pub struct InternalDocumentsTier {
    model: TierModel,
    documents: Arc<DocumentStore>,
    top_k: usize,
}

impl InternalDocumentsTier {
    pub fn new(model: TierModel, documents: Arc<DocumentStore>, top_k: usize) -> Self {
        Self {
            model,
            documents,
            top_k,
        }
    }
}

#[async_trait]
impl AnswerTier for InternalDocumentsTier {
    fn name(&self) -> &'static str {
        "internal_documents"
    }

    fn tier_number(&self) -> u8 {
        1
    }

    async fn attempt(
        &self,
        request: &TierRequest,
        cancel: &CancellationToken,
    ) -> Result<TierOutcome> {
        let hits = self.documents.search(&request.message, self.top_k).await?;
        if hits.is_empty() {
            return Ok(TierOutcome::Failure(FailureReason::NoDocuments));
        }

        let context = format_document_context(&hits);
        let prompt = prompts::build_internal_documents_prompt(
            &self.model.university,
            &request.message,
            &context,
            &request.history,
        );
        let generation = self.model.generate(prompt, false, cancel).await?;

        if prompts::is_sentinel(&generation.text, prompts::INSUFFICIENT_CONTEXT_SENTINEL) {
            return Ok(TierOutcome::Failure(FailureReason::InsufficientContext));
        }

        let mut sources: Vec<String> = Vec::new();
        for label in hits.iter().map(|hit| hit.source_label()) {
            if !sources.contains(&label) {
                sources.push(label);
            }
        }

        Ok(TierOutcome::Success(TierAnswer {
            text: generation.text,
            sources,
            chunks_used: Some(hits.len()),
            internal_docs_used: true,
            google_search_used: false,
        }))
    }
}

/// Tier 2: ungrounded model knowledge, declined for time-sensitive questions
pub struct ModelKnowledgeTier {
    model: TierModel,
}

impl ModelKnowledgeTier {
    pub const fn new(model: TierModel) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AnswerTier for ModelKnowledgeTier {
    fn name(&self) -> &'static str {
        "model_knowledge"
    }

    fn tier_number(&self) -> u8 {
        2
    }

    async fn attempt(
        &self,
        request: &TierRequest,
        cancel: &CancellationToken,
    ) -> Result<TierOutcome> {
        let prompt = prompts::build_model_knowledge_prompt(
            &self.model.university,
            &request.message,
            &request.history,
        );
        let generation = self.model.generate(prompt, false, cancel).await?;

        if prompts::is_sentinel(&generation.text, prompts::NEEDS_CURRENT_INFO_SENTINEL) {
            return Ok(TierOutcome::Failure(FailureReason::NeedsCurrentInfo));
        }

        Ok(TierOutcome::Success(TierAnswer {
            text: generation.text,
            ..TierAnswer::default()
        }))
    }
}

/// Tier 3: search-grounded generation
pub struct WebSearchTier {
    model: TierModel,
}

impl WebSearchTier {
    pub const fn new(model: TierModel) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AnswerTier for WebSearchTier {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn tier_number(&self) -> u8 {
        3
    }

    async fn attempt(
        &self,
        request: &TierRequest,
        cancel: &CancellationToken,
    ) -> Result<TierOutcome> {
        let prompt = prompts::build_web_search_prompt(
            &self.model.university,
            &request.message,
            &request.history,
        );
        let generation = self.model.generate(prompt, true, cancel).await?;

        Ok(TierOutcome::Success(TierAnswer {
            text: generation.text,
            sources: generation.sources,
            google_search_used: true,
            ..TierAnswer::default()
        }))
    }
}

/// A tier that did not answer, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierFailure {
    pub tier: u8,
    pub tier_name: &'static str,
    pub reason: FailureReason,
}

/// Result of the cascade
#[derive(Debug)]
pub struct TieredResponse {
    pub message: String,
    /// 1 to 3 for the answering tier, 0 when every tier failed
    pub tier: u8,
    pub tier_name: String,
    pub answer: Option<TierAnswer>,
    pub failures: Vec<TierFailure>,
    /// Error from the last tier that errored, if the cascade was exhausted
    pub last_error: Option<CampusRagError>,
}

impl TieredResponse {
    pub fn is_fallback(&self) -> bool {
        self.tier == 0
    }
}

pub struct TieredAnswerer {
    tiers: Vec<Box<dyn AnswerTier>>,
}

impl TieredAnswerer {
    pub fn new(tiers: Vec<Box<dyn AnswerTier>>) -> Self {
        Self { tiers }
    }

    /// Documents, then model knowledge, then web search
    pub fn standard(
        model: Arc<dyn LanguageModel>,
        documents: Arc<DocumentStore>,
        config: &AppConfig,
    ) -> Self {
        let tier_model = TierModel::new(model, config);
        Self::new(vec![
            Box::new(InternalDocumentsTier::new(
                tier_model.clone(),
                documents,
                config.retrieval.document_top_k,
            )),
            Box::new(ModelKnowledgeTier::new(tier_model.clone())),
            Box::new(WebSearchTier::new(tier_model)),
        ])
    }

    /// Run the cascade.
    ///
    /// # Errors
    /// - [`CampusRagError::Cancelled`] if `cancel` fires; all other tier errors
    ///   are absorbed into the failure list
    pub async fn answer(
        &self,
        request: &TierRequest,
        cancel: &CancellationToken,
    ) -> Result<TieredResponse> {
        let mut failures = Vec::with_capacity(self.tiers.len());
        let mut last_error = None;

        for tier in &self.tiers {
            if cancel.is_cancelled() {
                return Err(CampusRagError::Cancelled);
            }
            debug!("Trying tier {} ({})", tier.tier_number(), tier.name());

            let reason = match tier.attempt(request, cancel).await {
                Ok(TierOutcome::Success(answer)) => {
                    info!("Answered by tier {} ({})", tier.tier_number(), tier.name());
                    return Ok(TieredResponse {
                        message: answer.text.clone(),
                        tier: tier.tier_number(),
                        tier_name: tier.name().to_string(),
                        answer: Some(answer),
                        failures,
                        last_error: None,
                    });
                }
                Ok(TierOutcome::Failure(reason)) => reason,
                Err(CampusRagError::Cancelled) => return Err(CampusRagError::Cancelled),
                Err(e) => {
                    warn!("Tier {} ({}) failed: {e}", tier.tier_number(), tier.name());
                    last_error = Some(e);
                    FailureReason::Error
                }
            };

            debug!("Tier {} declined: {reason:?}", tier.tier_number());
            failures.push(TierFailure {
                tier: tier.tier_number(),
                tier_name: tier.name(),
                reason,
            });
        }

        warn!("All answer tiers failed: {failures:?}");
        Ok(TieredResponse {
            message: prompts::TIERS_EXHAUSTED_APOLOGY.to_string(),
            tier: 0,
            tier_name: "fallback".to_string(),
            answer: None,
            failures,
            last_error,
        })
    }
}
