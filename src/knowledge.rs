//! Read-only, process-lifetime knowledge store
//!
//! The knowledge base is loaded once at startup and shared across requests
//! through an `Arc`. Reloading requires a restart.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::models::Chunk;
use crate::models::KnowledgeBase;

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    knowledge_base: Arc<KnowledgeBase>,
}

impl KnowledgeStore {
    /// Load the knowledge base JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            CampusRagError::KnowledgeBase(format!("Failed to read {}: {e}", path.display()))
        })?;
        let knowledge_base: KnowledgeBase = serde_json::from_str(&raw)?;

        let store = Self::from_knowledge_base(knowledge_base);
        info!(
            "Loaded knowledge base v{} ({} chunks, {} with embeddings) from {}",
            store.knowledge_base.version,
            store.knowledge_base.chunks.len(),
            store.knowledge_base.embedded_count(),
            path.display()
        );
        Ok(store)
    }

    #[must_use]
    pub fn from_knowledge_base(knowledge_base: KnowledgeBase) -> Self {
        if knowledge_base.total_chunks != knowledge_base.chunks.len() {
            warn!(
                "Knowledge base declares {} chunks but contains {}",
                knowledge_base.total_chunks,
                knowledge_base.chunks.len()
            );
        }

        if let Some(dimension) = knowledge_base.embedding_dimension() {
            let mismatched = knowledge_base
                .chunks
                .iter()
                .filter_map(|c| c.embedding.as_ref())
                .filter(|e| !e.is_empty() && e.len() != dimension)
                .count();
            if mismatched > 0 {
                // The ranker skips these chunks
                warn!("{mismatched} chunk embeddings differ from dimension {dimension}");
            }
        }

        Self {
            knowledge_base: Arc::new(knowledge_base),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.knowledge_base.chunks
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    /// Whether similarity ranking can run at all
    pub fn has_embeddings(&self) -> bool {
        self.knowledge_base.chunks.iter().any(Chunk::has_embedding)
    }

    pub fn len(&self) -> usize {
        self.knowledge_base.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knowledge_base.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version":"1","last_updated":"2024-01-01T00:00:00Z","total_chunks":1,
               "categories":["dining"],
               "chunks":[{{"id":"a","title":"Hinman Dining","category":"dining","content":"open late"}}]}}"#
        )
        .unwrap();

        let store = KnowledgeStore::load(file.path()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.has_embeddings());
        assert_eq!(store.chunks()[0].title, "Hinman Dining");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = KnowledgeStore::load("/no/such/knowledge_base.json").await;
        assert!(matches!(result, Err(CampusRagError::KnowledgeBase(_))));
    }
}
