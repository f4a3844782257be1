use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A unit of retrievable text from the knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub title: String,
    pub category: String,
    /// Plain text, markdown already stripped
    pub content: String,
    /// Lowercase, stopword-free, de-duplicated
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
    /// Present only after the offline embedding pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Source filename plus free-form fields (course number, instructor, week...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The knowledge base file as produced by the consolidation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub total_chunks: usize,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    pub chunks: Vec<Chunk>,
}

impl KnowledgeBase {
    /// Number of chunks carrying an embedding
    pub fn embedded_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.has_embedding()).count()
    }

    /// Embedding dimension of the first embedded chunk
    pub fn embedding_dimension(&self) -> Option<usize> {
        self.chunks
            .iter()
            .find_map(|c| c.embedding.as_ref().filter(|e| !e.is_empty()))
            .map(Vec::len)
    }
}

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    #[serde(alias = "assistant")]
    Bot,
}

/// One prior message of the conversation, as the chat UI sends it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(rename = "type")]
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Bot,
            content: content.into(),
        }
    }
}

/// The last `n` turns of a conversation, oldest first
pub fn recent_turns(history: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(n)..]
}
