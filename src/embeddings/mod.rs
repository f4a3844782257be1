//! Query embedding
//!
//! Chunk embeddings are produced offline and shipped inside the knowledge
//! base file. At request time only the user's query needs embedding, using the
//! same model so that the vectors are comparable.
//!
//! # Examples
//!
//! ```rust,no_run
//! use campusrag::config::AppConfig;
//! use campusrag::embeddings::EmbeddingClient;
//! use campusrag::embeddings::QueryEmbedder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let client = EmbeddingClient::new(&config.llm)?;
//!
//!     let embedding = client.embed("When is CS 515?").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod client;

use async_trait::async_trait;
pub use client::EmbeddingClient;

use crate::errors::Result;

#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Embed a single query string
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
