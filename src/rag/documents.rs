//! Raw course-document corpus used by the internal-documents tier
//!
//! The corpus is read from disk on first use and kept for the lifetime of the
//! process. Search is plain term overlap; no embeddings are involved.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::info;

use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::rag::keyword::tokenize;

/// One processed chunk of an original course document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    /// Original filename, e.g. `syllabi/CS_515-fall.pdf`
    pub source: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct DocumentsFile {
    documents: Vec<DocumentChunk>,
}

/// A document chunk matched by [`DocumentStore::search`]
#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub chunk: DocumentChunk,
    /// Number of distinct query terms found in the text
    pub matches: usize,
}

impl DocumentHit {
    pub fn source_label(&self) -> String {
        sanitize_source_label(&self.chunk.source)
    }
}

pub struct DocumentStore {
    path: Option<PathBuf>,
    documents: OnceCell<Vec<DocumentChunk>>,
}

impl DocumentStore {
    /// Store that loads `path` lazily on the first search
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            documents: OnceCell::new(),
        }
    }

    /// Store over an already-loaded corpus
    pub fn from_documents(documents: Vec<DocumentChunk>) -> Self {
        Self {
            path: None,
            documents: OnceCell::new_with(Some(documents)),
        }
    }

    async fn documents(&self) -> Result<&[DocumentChunk]> {
        let documents = self
            .documents
            .get_or_try_init(|| async {
                let Some(path) = &self.path else {
                    return Ok(Vec::new());
                };
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CampusRagError::KnowledgeBase(format!(
                        "Failed to read documents file {}: {e}",
                        path.display()
                    ))
                })?;
                let file: DocumentsFile = serde_json::from_str(&raw)?;
                info!(
                    "Loaded {} document chunks from {}",
                    file.documents.len(),
                    path.display()
                );
                Ok::<_, CampusRagError>(file.documents)
            })
            .await?;
        Ok(documents)
    }

    /// Chunks sharing at least one term with the query, most matches first.
    ///
    /// A failed load is not cached; the next search retries it.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocumentHit>> {
        let mut terms = tokenize(query);
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.documents().await?;
        let mut hits: Vec<DocumentHit> = documents
            .iter()
            .filter_map(|chunk| {
                let text = chunk.text.to_lowercase();
                let mut seen: Vec<&str> = Vec::new();
                for term in &terms {
                    if text.contains(term.as_str()) && !seen.contains(&term.as_str()) {
                        seen.push(term.as_str());
                    }
                }
                (!seen.is_empty()).then(|| DocumentHit {
                    chunk: chunk.clone(),
                    matches: seen.len(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.matches.cmp(&a.matches));
        hits.truncate(top_k);
        debug!("Document search matched {} chunks", hits.len());
        Ok(hits)
    }
}

/// Turn a stored filename into a readable citation label.
///
/// `"syllabi/CS_515-fall.pdf"` becomes `"CS 515 fall"`.
pub fn sanitize_source_label(source: &str) -> String {
    let file_name = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render hits as a context block for the grounded prompt
pub fn format_document_context(hits: &[DocumentHit]) -> String {
    hits.iter()
        .map(|hit| format!("[Document: {}]\n{}", hit.source_label(), hit.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
