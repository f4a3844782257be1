//! Gemini `generateContent` client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::config::LlmConfig;
use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::llm::Generation;
use crate::llm::GenerationRequest;
use crate::llm::LanguageModel;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client from the `[llm]` config section
    ///
    /// # Errors
    /// - HTTP client build errors
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.request_timeout_secs)?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let url = model_url(&self.endpoint, &self.model, "generateContent")?;
        debug!(
            "Calling Gemini generateContent (model: {}, web_search: {})",
            self.model, request.web_search
        );

        let body = GenerateContentRequest::from(request);
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(api_error(status.as_u16(), &error_text));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CampusRagError::LlmError(format!("Failed to parse response: {e}")))?;

        result.into_generation()
    }
}

/// Shared reqwest client setup for the Gemini endpoints
pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| CampusRagError::HttpError(e.to_string()))
}

/// `{endpoint}/models/{model}:{method}`
pub(crate) fn model_url(endpoint: &str, model: &str, method: &str) -> Result<Url> {
    let raw = format!("{}/models/{model}:{method}", endpoint.trim_end_matches('/'));
    Url::parse(&raw)
        .map_err(|e| CampusRagError::ConfigError(format!("Invalid model endpoint {raw}: {e}")))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Turn a non-success response into an [`CampusRagError::Upstream`].
///
/// The provider's status string (e.g. `RESOURCE_EXHAUSTED`) is kept in the
/// message so that error classification can see it.
pub(crate) fn api_error(status: u16, body: &str) -> CampusRagError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{code}: {}", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) => body.trim().to_string(),
    };
    CampusRagError::Upstream { status, message }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct Tool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

impl<'a> From<&'a GenerationRequest> for GenerateContentRequest<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        let tools = if request.web_search {
            vec![Tool {
                google_search: serde_json::Map::new(),
            }]
        } else {
            Vec::new()
        };

        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
            tools,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
}

impl GenerateContentResponse {
    fn into_generation(self) -> Result<Generation> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CampusRagError::LlmError(format!(
                "Prompt blocked by safety filters: {reason}"
            )));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| CampusRagError::LlmError("No candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
            if reason == "SAFETY" {
                return Err(CampusRagError::LlmError(
                    "Response blocked by safety filters".to_string(),
                ));
            }
            warn!("Empty model response (finish reason: {reason})");
            return Err(CampusRagError::LlmError(format!(
                "Empty response from model (finish reason: {reason})"
            )));
        }

        let mut sources: Vec<String> = Vec::new();
        for uri in candidate
            .grounding_metadata
            .into_iter()
            .flat_map(|metadata| metadata.grounding_chunks)
            .filter_map(|chunk| chunk.web.and_then(|web| web.uri))
        {
            if !sources.contains(&uri) {
                sources.push(uri);
            }
        }

        Ok(Generation { text, sources })
    }
}
