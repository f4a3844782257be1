//! Generative model access
//!
//! The rest of the crate talks to the model through [`LanguageModel`], so
//! retrieval and tier logic can be exercised against scripted models in tests.

pub mod gemini;
pub mod retry;

use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use retry::RetryPolicy;

use crate::errors::Result;

/// One text-generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Enable the provider's web-search grounding tool
    pub web_search: bool,
}

/// Model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    /// Source URIs cited by search grounding, empty without it
    pub sources: Vec<String>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}
