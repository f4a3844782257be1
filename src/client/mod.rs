//! HTTP chat client for a running campusrag server
//!
//! Keeps the conversation history between turns and routes each message
//! through [`ApiRouter`], falling back to the simple endpoint once when the
//! RAG endpoint fails.

use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::api::types::ChatRequest;
use crate::config::RouterConfig;
use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::models::ConversationTurn;

pub mod router;

pub use router::ApiRouter;
pub use router::Endpoint;

/// Answer returned to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub message: String,
    pub endpoint: Endpoint,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    message: String,
    #[serde(default)]
    metadata: ReplyMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyMetadata {
    #[serde(default)]
    cached: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub struct ChatClient {
    client: Client,
    base_url: Url,
    router: ApiRouter,
    history: Vec<ConversationTurn>,
}

impl ChatClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str, router: RouterConfig, timeout_secs: u64) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            CampusRagError::ConfigError(format!("Invalid server URL {base_url}: {e}"))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            router: ApiRouter::new(router),
            history: Vec::new(),
        })
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Send a message and record the exchange in the history
    ///
    /// Nothing is appended when the request fails or is cancelled.
    pub async fn send(&mut self, message: &str, cancel: &CancellationToken) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(CampusRagError::InvalidRequest(
                "Message is required".to_string(),
            ));
        }

        let reply = match self.router.choose() {
            Endpoint::Rag => match self.post(Endpoint::Rag, message, cancel).await {
                Ok(reply) => {
                    self.router.record_success(Endpoint::Rag);
                    reply
                }
                Err(e) if !should_fall_back(&e) => return Err(e),
                Err(e) => {
                    warn!("RAG endpoint failed, retrying on the simple endpoint: {}", e);
                    self.router.record_failure(Endpoint::Rag);
                    self.post(Endpoint::Simple, message, cancel).await?
                }
            },
            Endpoint::Simple => self.post(Endpoint::Simple, message, cancel).await?,
        };

        if cancel.is_cancelled() {
            return Err(CampusRagError::Cancelled);
        }

        self.history.push(ConversationTurn::user(message));
        self.history.push(ConversationTurn::bot(reply.message.clone()));
        Ok(reply)
    }

    async fn post(
        &self,
        endpoint: Endpoint,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatReply> {
        if cancel.is_cancelled() {
            return Err(CampusRagError::Cancelled);
        }

        let url = self.base_url.join(endpoint.path()).map_err(|e| {
            CampusRagError::ConfigError(format!("Invalid endpoint path {}: {e}", endpoint.path()))
        })?;
        let body = ChatRequest::new(message, self.history.clone());
        debug!("POST {} ({} history turns)", url, self.history.len());

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(CampusRagError::Cancelled),
            response = self.client.post(url).json(&body).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            return Err(CampusRagError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: ReplyBody = response.json().await?;
        Ok(ChatReply {
            message: body.message,
            endpoint,
            cached: body.metadata.cached,
        })
    }
}

/// Client mistakes and quota denials would fail the same way on the simple
/// endpoint.
fn should_fall_back(err: &CampusRagError) -> bool {
    match err {
        CampusRagError::Cancelled | CampusRagError::InvalidRequest(_) => false,
        CampusRagError::Upstream { status, .. } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            status != StatusCode::BAD_REQUEST && status != StatusCode::TOO_MANY_REQUESTS
        }
        _ => true,
    }
}
