//! Linear-scan cosine similarity ranking over chunk embeddings

use crate::models::Chunk;
use crate::rag::MatchType;
use crate::rag::RankedChunk;

/// Cosine similarity of two vectors.
///
/// Returns `0.0` for empty or mismatched-length inputs and for zero-magnitude
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }

    dot / magnitude
}

#[derive(Debug, Clone)]
pub struct SimilarityOptions {
    pub top_k: usize,
    /// Results strictly below this score are dropped
    pub min_score: f32,
    pub category_filter: Option<String>,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
            category_filter: None,
        }
    }
}

impl From<&crate::config::RetrievalConfig> for SimilarityOptions {
    fn from(config: &crate::config::RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            category_filter: config.category_filter.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRanker;

impl SimilarityRanker {
    /// Score every embedded chunk against the query vector.
    ///
    /// Chunks whose embedding length differs from the query are skipped.
    /// Ties keep the original chunk order.
    pub fn rank<'a>(
        &self,
        query_embedding: &[f32],
        chunks: &'a [Chunk],
        options: &SimilarityOptions,
    ) -> Vec<RankedChunk<'a>> {
        let mut results: Vec<RankedChunk<'a>> = chunks
            .iter()
            .filter(|chunk| {
                options
                    .category_filter
                    .as_ref()
                    .map_or(true, |category| &chunk.category == category)
            })
            .filter_map(|chunk| {
                let embedding = chunk
                    .embedding
                    .as_deref()
                    .filter(|e| e.len() == query_embedding.len())?;
                let score = cosine_similarity(query_embedding, embedding);
                (score >= options.min_score).then(|| RankedChunk {
                    chunk,
                    score,
                    match_type: MatchType::Semantic,
                    matched_terms: Vec::new(),
                })
            })
            .collect();

        // sort_by is stable
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(options.top_k);
        results
    }
}
