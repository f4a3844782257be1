//! Test doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use campusrag::embeddings::QueryEmbedder;
use campusrag::llm::Generation;
use campusrag::llm::GenerationRequest;
use campusrag::llm::LanguageModel;
use campusrag::AppConfig;
use campusrag::CampusRagError;
use campusrag::Result;

/// Model that replays queued replies and records every request.
///
/// Once the queue is empty it answers with a fixed text.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Generation>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Generation>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(Generation::text(text))])
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Generation::text("Default scripted answer.")))
    }
}

/// Embedder returning the same vector for every query
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl QueryEmbedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

pub fn upstream(status: u16, message: &str) -> CampusRagError {
    CampusRagError::Upstream {
        status,
        message: message.to_string(),
    }
}

pub fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

/// Defaults with no retries, in-memory rate limiting and the bundled data files
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 1;
    config.rate_limit.state_path = None;
    config.rate_limit.min_interval_ms = 0;
    config.knowledge.knowledge_base_path = data_path("knowledge_base.json");
    config.knowledge.documents_path = data_path("documents.json");
    config
}
