//! API request and response types

use serde::Deserialize;
use serde::Serialize;

use crate::api::cache::CacheStats;
use crate::api::rate_limit::RetryAfter;
use crate::api::rate_limit::UsageSnapshot;
use crate::models::ConversationTurn;
use crate::rag::tiered::TierFailure;
use crate::rag::SearchMethod;

/// Body shared by all chat endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, conversation_history: Vec<ConversationTurn>) -> Self {
        Self {
            message: Some(message.into()),
            conversation_history,
        }
    }

    /// The trimmed message, or `None` when missing or blank
    pub fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagMetadata {
    pub chunks_found: usize,
    pub search_method: SearchMethod,
    /// Milliseconds
    pub processing_time: u64,
    pub cached: bool,
    pub used_fallback: bool,
    pub web_search_used: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagChatResponse {
    pub message: String,
    pub metadata: RagMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredMetadata {
    /// 1 to 3, or 0 for the fallback apology
    pub tier: u8,
    pub tier_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_docs_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_used: Option<usize>,
    pub cached: bool,
    pub processing_time: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<TierFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TieredChatResponse {
    pub message: String,
    pub metadata: TieredMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMetadata {
    pub processing_time: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleChatResponse {
    pub message: String,
    pub metadata: SimpleMetadata,
}

/// 429 body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedResponse {
    pub error: String,
    pub message: String,
    pub retry_after: RetryAfter,
    pub rate_limited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub university: String,
    pub model: String,
    pub features: HealthFeatures,
    pub knowledge_base: KnowledgeBaseInfo,
    pub limits: LimitInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthFeatures {
    pub rag: bool,
    pub tiered: bool,
    pub web_search: bool,
    pub embeddings: bool,
    pub response_cache: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseInfo {
    pub version: String,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitInfo {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub min_interval_ms: u64,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    #[serde(flatten)]
    pub usage: UsageSnapshot,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_parses_history() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"message": "  When is CS 101? ", "conversationHistory": [
                {"type": "user", "content": "hi"},
                {"type": "bot", "content": "hello"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(request.message(), Some("When is CS 101?"));
        assert_eq!(request.conversation_history.len(), 2);
    }

    #[test]
    fn test_blank_or_missing_message() {
        let missing: ChatRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.message(), None);
        assert_eq!(ChatRequest::new("   ", Vec::new()).message(), None);
    }

    #[test]
    fn test_tiered_metadata_omits_unset_fields() {
        let response = TieredChatResponse {
            message: "answer".to_string(),
            metadata: TieredMetadata {
                tier: 2,
                tier_name: "model_knowledge".to_string(),
                internal_docs_used: None,
                google_search_used: None,
                sources: None,
                chunks_used: None,
                cached: false,
                processing_time: 12,
                failure_reasons: Vec::new(),
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["metadata"]["tierName"], "model_knowledge");
        assert!(json["metadata"].get("sources").is_none());
        assert!(json["metadata"].get("failureReasons").is_none());
    }

    #[test]
    fn test_rate_limited_body() {
        let body = RateLimitedResponse {
            error: "daily_limit_exceeded".to_string(),
            message: "later".to_string(),
            retry_after: RetryAfter::Tomorrow,
            rate_limited: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["retryAfter"], "tomorrow");
        assert_eq!(json["rateLimited"], true);
    }
}
