//! Keyword-overlap ranking, the fallback when embeddings are unavailable

use crate::models::Chunk;
use crate::rag::MatchType;
use crate::rag::RankedChunk;

const TITLE_WEIGHT: f32 = 2.0;
const KEYWORD_WEIGHT: f32 = 1.5;

/// Lowercase words longer than two characters, split on non-alphanumerics
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRanker;

impl KeywordRanker {
    /// Rank chunks by weighted keyword overlap with the query.
    ///
    /// Chunks scoring zero are never returned.
    pub fn rank<'a>(&self, query: &str, chunks: &'a [Chunk], top_k: usize) -> Vec<RankedChunk<'a>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<RankedChunk<'a>> = chunks
            .iter()
            .filter_map(|chunk| Self::score_chunk(&tokens, chunk))
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        results
    }

    fn score_chunk<'a>(tokens: &[String], chunk: &'a Chunk) -> Option<RankedChunk<'a>> {
        let content = chunk.content.to_lowercase();
        let title = chunk.title.to_lowercase();

        let mut content_matches = 0_usize;
        let mut title_matches = 0_usize;
        let mut keyword_matches = 0_usize;
        let mut matched_terms: Vec<String> = Vec::new();

        for token in tokens {
            let in_content = content.contains(token.as_str());
            let in_title = title.contains(token.as_str());
            let in_keywords = chunk.keywords.iter().any(|k| k == token);

            content_matches += usize::from(in_content);
            title_matches += usize::from(in_title);
            keyword_matches += usize::from(in_keywords);

            if (in_content || in_title || in_keywords) && !matched_terms.contains(token) {
                matched_terms.push(token.clone());
            }
        }

        let weighted = content_matches as f32
            + TITLE_WEIGHT * title_matches as f32
            + KEYWORD_WEIGHT * keyword_matches as f32;
        let score = weighted / tokens.len() as f32;

        (score > 0.0).then_some(RankedChunk {
            chunk,
            score,
            match_type: MatchType::Keyword,
            matched_terms,
        })
    }
}
