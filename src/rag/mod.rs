//! RAG (Retrieval-Augmented Generation) module
//!
//! This module provides end-to-end RAG functionality for campus questions:
//! - Query expansion from conversation context (course numbers, pronouns)
//! - Semantic retrieval over precomputed chunk embeddings
//! - Keyword retrieval as the fallback when embeddings are unavailable
//! - Context assembly and grounded answer generation
//! - The three-tier answerer (internal documents, model knowledge, web search)
//!
//! # Examples
//!
//! ```rust,no_run
//! use campusrag::rag::KeywordRanker;
//! use campusrag::knowledge::KnowledgeStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = KnowledgeStore::load("data/knowledge_base.json").await?;
//!     let results = KeywordRanker.rank("Hinman dining hours", store.chunks(), 5);
//!     for result in results {
//!         println!("{} ({:.2})", result.chunk.title, result.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod documents;
pub mod expander;
pub mod keyword;
pub mod pipeline;
pub mod prompts;
pub mod similarity;
pub mod tiered;

pub use context::ContextAssembler;
pub use documents::DocumentStore;
pub use expander::QueryExpander;
pub use keyword::KeywordRanker;
pub use pipeline::RagService;
pub use similarity::cosine_similarity;
pub use similarity::SimilarityOptions;
pub use similarity::SimilarityRanker;
pub use tiered::TieredAnswerer;

use serde::Serialize;

use crate::models::Chunk;

/// A chunk with its relevance score for one query
#[derive(Debug, Clone)]
pub struct RankedChunk<'a> {
    pub chunk: &'a Chunk,
    /// Cosine similarity or keyword match score; not clamped
    pub score: f32,
    pub match_type: MatchType,
    /// Query terms that hit the chunk (keyword search only)
    pub matched_terms: Vec<String>,
}

/// Type of match for the search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Vector similarity match
    Semantic,
    /// Text keyword match
    Keyword,
}

/// Retrieval strategy that produced the context, as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Vector,
    Keyword,
}
