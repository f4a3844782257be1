use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Environment variable prefix for overrides, e.g. `CAMPUSRAG__LLM__API_KEY`
pub const ENV_PREFIX: &str = "CAMPUSRAG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Requests handled at once before callers queue
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            enable_cors: true,
            max_concurrent_requests: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            backtrace: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Generative Language API
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model: default_llm_model(),
            embedding_model: "text-embedding-004".to_string(),
            temperature: 0.7,
            max_output_tokens: 1024,
            request_timeout_secs: 60,
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Retry policy for transient model errors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles every attempt
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub knowledge_base_path: PathBuf,
    pub documents_path: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: PathBuf::from("data/knowledge_base.json"),
            documents_path: PathBuf::from("data/documents.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub category_filter: Option<String>,
    pub max_context_chars: usize,
    /// Conversation messages included in the RAG chat prompt
    pub rag_history_messages: usize,
    /// Conversation messages included in the supplementary web-search prompt
    pub web_history_messages: usize,
    /// Document chunks fed to the internal-documents tier
    pub document_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
            category_filter: None,
            max_context_chars: 8000,
            rag_history_messages: 6,
            web_history_messages: 4,
            document_top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    /// Minimum spacing between accepted requests
    pub min_interval_ms: u64,
    /// Where counters are persisted; `None` keeps them in memory only
    pub state_path: Option<PathBuf>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 15,
            requests_per_day: 1500,
            min_interval_ms: 1000,
            state_path: Some(PathBuf::from("data/rate_limit_state.json")),
        }
    }
}

/// Client-side endpoint routing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub failure_threshold: usize,
    pub failure_window_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window_secs: 300,
            cooldown_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub university_name: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            university_name: "Binghamton University".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub knowledge: KnowledgeConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub router: RouterConfig,
    pub assistant: AssistantConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment overrides on top
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::CampusRagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Config file not found: {}", path.display()),
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(env_source())
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from the default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            tracing::warn!("No config file found, using built-in defaults");
            let settings = config::Config::builder().add_source(env_source()).build()?;
            Ok(settings.try_deserialize()?)
        }
    }

    /// Fail early when the server cannot possibly reach the model provider
    pub fn validate(&self) -> crate::Result<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(crate::CampusRagError::ConfigError(format!(
                "llm.api_key is empty; set it in config.toml or {ENV_PREFIX}__LLM__API_KEY"
            )));
        }
        url::Url::parse(&self.llm.endpoint).map_err(|e| {
            crate::CampusRagError::ConfigError(format!("llm.endpoint is not a valid URL: {e}"))
        })?;
        if self.rate_limit.requests_per_day == 0 || self.rate_limit.requests_per_minute == 0 {
            return Err(crate::CampusRagError::ConfigError(
                "rate limits must be greater than zero".to_string(),
            ));
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(crate::CampusRagError::ConfigError(
                "server.max_concurrent_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML, with the API key masked
    pub fn to_redacted_toml(&self) -> crate::Result<String> {
        let mut redacted = self.clone();
        if !redacted.llm.api_key.is_empty() {
            redacted.llm.api_key = "********".to_string();
        }
        toml::to_string_pretty(&redacted)
            .map_err(|e| crate::CampusRagError::ConfigError(e.to_string()))
    }

    /// Get LLM model
    pub fn llm_model(&self) -> &str {
        &self.llm.model
    }

    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
