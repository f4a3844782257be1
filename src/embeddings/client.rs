//! Gemini `embedContent` client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::LlmConfig;
use crate::embeddings::QueryEmbedder;
use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::llm::gemini::api_error;
use crate::llm::gemini::build_http_client;
use crate::llm::gemini::model_url;

/// Client for query embeddings
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    /// Create a new embedding client
    ///
    /// # Errors
    /// - HTTP client build errors (invalid configuration)
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.request_timeout_secs)?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
        })
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl QueryEmbedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = model_url(&self.endpoint, &self.model, "embedContent")?;
        debug!("Calling Gemini embedContent (model: {})", self.model);

        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CampusRagError::EmbeddingError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CampusRagError::EmbeddingError(
                api_error(status.as_u16(), &error_text).to_string(),
            ));
        }

        let result: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| CampusRagError::EmbeddingError(format!("Failed to parse response: {e}")))?;

        if result.embedding.values.is_empty() {
            return Err(CampusRagError::EmbeddingError(
                "No embedding in response".to_string(),
            ));
        }
        Ok(result.embedding.values)
    }
}
