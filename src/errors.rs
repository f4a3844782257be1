use thiserror::Error;

#[derive(Error, Debug)]
pub enum CampusRagError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// Non-success status returned by the model provider
    #[error("Upstream API error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, CampusRagError>;

/// Coarse classification of an upstream failure, decided from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Provider quota or rate limit hit
    Quota,
    /// Missing, invalid or unauthorized API key
    Auth,
    /// Prompt or answer blocked by content-safety filters
    Safety,
    Other,
}

const TRANSIENT_SIGNATURES: &[&str] = &[
    "overloaded",
    "rate limit",
    "rate-limit",
    "resource exhausted",
    "resource_exhausted",
    "unavailable",
    "too many requests",
];

const QUOTA_SIGNATURES: &[&str] = &[
    "quota",
    "rate limit",
    "rate-limit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
];

const AUTH_SIGNATURES: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "unauthorized",
    "unauthenticated",
    "permission denied",
    "permission_denied",
];

const SAFETY_SIGNATURES: &[&str] = &["safety", "blocked", "prohibited content"];

impl CampusRagError {
    /// Whether the error is an overloaded / rate-limited signature that may
    /// succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream { status, message } => {
                matches!(status, 429 | 503) || contains_any(message, TRANSIENT_SIGNATURES)
            }
            Self::LlmError(message) | Self::EmbeddingError(message) => {
                contains_any(message, TRANSIENT_SIGNATURES)
            }
            _ => false,
        }
    }

    /// Sniff the error text to decide how it should surface to the caller.
    pub fn upstream_kind(&self) -> UpstreamErrorKind {
        if let Self::Upstream { status, .. } = self {
            match status {
                429 => return UpstreamErrorKind::Quota,
                401 | 403 => return UpstreamErrorKind::Auth,
                _ => {}
            }
        }

        let text = self.to_string();
        if contains_any(&text, QUOTA_SIGNATURES) {
            UpstreamErrorKind::Quota
        } else if contains_any(&text, AUTH_SIGNATURES) {
            UpstreamErrorKind::Auth
        } else if contains_any(&text, SAFETY_SIGNATURES) {
            UpstreamErrorKind::Safety
        } else {
            UpstreamErrorKind::Other
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

impl From<reqwest::Error> for CampusRagError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}
