//! Context assembly from retrieved chunks

use crate::cli::output::truncate_str;
use crate::rag::RankedChunk;

/// Assembler for creating context from ranked chunks
pub struct ContextAssembler {
    max_context_length: usize,
}

impl ContextAssembler {
    /// Create a new context assembler
    #[must_use]
    pub const fn new(max_context_length: usize) -> Self {
        Self { max_context_length }
    }

    /// Assemble context from ranked chunks, best first, within the length budget
    ///
    /// The best chunk is always included, cut short if it alone exceeds the
    /// budget; later chunks are only added whole.
    #[must_use]
    pub fn assemble(&self, results: &[RankedChunk<'_>]) -> String {
        let mut context = String::new();

        for (idx, result) in results.iter().enumerate() {
            let header = format!(
                "\n[Source {}: {} ({})]\n",
                idx + 1,
                result.chunk.title,
                result.chunk.category
            );
            let entry_len = header.len() + result.chunk.content.len() + 1;

            if context.len() + entry_len > self.max_context_length {
                if idx == 0 {
                    let budget = self.max_context_length.saturating_sub(header.len() + 1);
                    context.push_str(&header);
                    context.push_str(truncate_bytes(&result.chunk.content, budget));
                    context.push('\n');
                }
                break;
            }

            context.push_str(&header);
            context.push_str(&result.chunk.content);
            context.push('\n');
        }

        context
    }

    /// Answer composed locally from the best chunk when the model is unreachable
    #[must_use]
    pub fn fallback_answer(&self, results: &[RankedChunk<'_>]) -> String {
        match results.first() {
            Some(best) => format!(
                "I'm having trouble reaching the assistant right now, but here is what I found \
                 about **{}**:\n\n{}",
                best.chunk.title,
                truncate_str(&best.chunk.content, 600)
            ),
            None => crate::rag::prompts::UNAVAILABLE_APOLOGY.to_string(),
        }
    }
}

/// Longest prefix of `s` within `max_bytes` that ends on a char boundary
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(8000) // Default max context length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::models::ChunkMetadata;
    use crate::rag::MatchType;

    fn chunk(title: &str, content: &str) -> Chunk {
        Chunk {
            id: title.to_lowercase(),
            title: title.to_string(),
            category: "dining".to_string(),
            content: content.to_string(),
            keywords: Vec::new(),
            metadata: ChunkMetadata::default(),
            embedding: None,
        }
    }

    fn ranked(chunk: &Chunk) -> RankedChunk<'_> {
        RankedChunk {
            chunk,
            score: 0.9,
            match_type: MatchType::Keyword,
            matched_terms: Vec::new(),
        }
    }

    #[test]
    fn test_assemble_respects_max_length() {
        let a = chunk("Hinman", &"a".repeat(60));
        let b = chunk("C4", &"b".repeat(60));
        let results = vec![ranked(&a), ranked(&b)];

        let context = ContextAssembler::new(100).assemble(&results);

        assert!(context.contains("[Source 1: Hinman (dining)]"));
        assert!(context.contains(&"a".repeat(60)));
        assert!(!context.contains("C4"));
    }

    #[test]
    fn test_oversized_best_chunk_is_truncated() {
        let a = chunk("Hinman", &"é".repeat(200));
        let context = ContextAssembler::new(100).assemble(&[ranked(&a)]);

        assert!(context.starts_with("\n[Source 1: Hinman (dining)]\n"));
        assert!(context.contains('é'));
        assert!(context.len() <= 100);
    }

    #[test]
    fn test_fallback_answer() {
        let a = chunk("Hinman Dining", "Open 7am to 9pm.");
        let assembler = ContextAssembler::default();

        let answer = assembler.fallback_answer(&[ranked(&a)]);
        assert!(answer.contains("Hinman Dining"));
        assert!(answer.contains("Open 7am to 9pm."));

        assert_eq!(
            assembler.fallback_answer(&[]),
            crate::rag::prompts::UNAVAILABLE_APOLOGY
        );
    }
}
