//! Single-tier RAG pipeline: Expand -> Retrieve -> Assemble -> Generate

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::embeddings::QueryEmbedder;
use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::knowledge::KnowledgeStore;
use crate::llm::GenerationRequest;
use crate::llm::LanguageModel;
use crate::llm::RetryPolicy;
use crate::models::recent_turns;
use crate::models::ConversationTurn;
use crate::rag::prompts;
use crate::rag::ContextAssembler;
use crate::rag::KeywordRanker;
use crate::rag::QueryExpander;
use crate::rag::RankedChunk;
use crate::rag::SearchMethod;
use crate::rag::SimilarityOptions;
use crate::rag::SimilarityRanker;

#[derive(Debug, Clone)]
struct RagSettings {
    university: String,
    temperature: f32,
    max_output_tokens: u32,
    rag_history_messages: usize,
    web_history_messages: usize,
}

/// Chunks found for one query
#[derive(Debug)]
pub struct Retrieval<'a> {
    pub expanded_query: String,
    pub method: SearchMethod,
    pub results: Vec<RankedChunk<'a>>,
}

/// RAG response
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub message: String,
    pub chunks_found: usize,
    pub search_method: SearchMethod,
    /// Answer composed locally because the model stayed unavailable
    pub used_fallback: bool,
    pub web_search_used: bool,
    /// Chunk titles, or cited URIs for a web-search answer
    pub sources: Vec<String>,
}

/// Complete RAG service over the campus knowledge base
pub struct RagService {
    knowledge: KnowledgeStore,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    expander: QueryExpander,
    context_assembler: ContextAssembler,
    similarity: SimilarityOptions,
    settings: RagSettings,
}

impl RagService {
    /// Create from existing services
    ///
    /// Without an embedder every query uses keyword ranking.
    pub fn new(
        knowledge: KnowledgeStore,
        embedder: Option<Arc<dyn QueryEmbedder>>,
        model: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        Self {
            knowledge,
            embedder,
            model,
            retry: RetryPolicy::from(&config.retry),
            expander: QueryExpander,
            context_assembler: ContextAssembler::new(config.retrieval.max_context_chars),
            similarity: SimilarityOptions::from(&config.retrieval),
            settings: RagSettings {
                university: config.assistant.university_name.clone(),
                temperature: config.llm.temperature,
                max_output_tokens: config.llm.max_output_tokens,
                rag_history_messages: config.retrieval.rag_history_messages,
                web_history_messages: config.retrieval.web_history_messages,
            },
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    /// Expand the message and rank knowledge-base chunks for it.
    ///
    /// Similarity ranking is used when chunks carry embeddings and the query
    /// embeds successfully; otherwise keyword ranking.
    pub async fn retrieve(
        &self,
        message: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<Retrieval<'_>> {
        let expanded_query = self.expander.expand(message, history);
        debug!("Expanded query: {expanded_query}");

        if let Some(embedder) = self.embedder.as_ref().filter(|_| self.knowledge.has_embeddings()) {
            if cancel.is_cancelled() {
                return Err(CampusRagError::Cancelled);
            }
            match embedder.embed(&expanded_query).await {
                Ok(query_embedding) => {
                    let results = SimilarityRanker.rank(
                        &query_embedding,
                        self.knowledge.chunks(),
                        &self.similarity,
                    );
                    return Ok(Retrieval {
                        expanded_query,
                        method: SearchMethod::Vector,
                        results,
                    });
                }
                Err(e) => warn!("Query embedding failed, using keyword search: {e}"),
            }
        }

        let results = KeywordRanker.rank(
            &expanded_query,
            self.knowledge.chunks(),
            self.similarity.top_k,
        );
        Ok(Retrieval {
            expanded_query,
            method: SearchMethod::Keyword,
            results,
        })
    }

    /// Answer a chat message.
    ///
    /// Without matching chunks the answer comes from search-grounded
    /// generation. Transient model failures that outlast the retry policy
    /// produce a locally composed answer.
    ///
    /// # Errors
    /// - [`CampusRagError::Cancelled`] when `cancel` fires
    /// - Non-transient model errors (auth, safety, bad request)
    pub async fn answer(
        &self,
        message: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<RagAnswer> {
        info!("Processing RAG query: {message}");

        let retrieval = self.retrieve(message, history, cancel).await?;
        let chunks_found = retrieval.results.len();
        debug!(
            "Retrieved {chunks_found} chunks via {:?}",
            retrieval.method
        );

        if retrieval.results.is_empty() {
            return self
                .answer_from_web(message, history, retrieval.method, cancel)
                .await;
        }

        let context = self.context_assembler.assemble(&retrieval.results);
        let prompt = prompts::build_rag_prompt(
            &self.settings.university,
            message,
            &context,
            recent_turns(history, self.settings.rag_history_messages),
        );
        let sources = retrieval
            .results
            .iter()
            .map(|r| r.chunk.title.clone())
            .collect();

        let (message, used_fallback) = match self.generate(prompt, false, cancel).await {
            Ok(generation) => (generation.text, false),
            Err(e) if e.is_transient() => {
                warn!("Model unavailable, answering from retrieved chunks: {e}");
                (self.context_assembler.fallback_answer(&retrieval.results), true)
            }
            Err(e) => return Err(e),
        };

        Ok(RagAnswer {
            message,
            chunks_found,
            search_method: retrieval.method,
            used_fallback,
            web_search_used: false,
            sources,
        })
    }

    async fn answer_from_web(
        &self,
        message: &str,
        history: &[ConversationTurn],
        search_method: SearchMethod,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer> {
        debug!("No knowledge-base match, using web search");
        let prompt = prompts::build_web_search_prompt(
            &self.settings.university,
            message,
            recent_turns(history, self.settings.web_history_messages),
        );

        let (message, sources, used_fallback, web_search_used) =
            match self.generate(prompt, true, cancel).await {
                Ok(generation) => (generation.text, generation.sources, false, true),
                Err(e) if e.is_transient() => {
                    warn!("Web search unavailable: {e}");
                    (prompts::UNAVAILABLE_APOLOGY.to_string(), Vec::new(), true, false)
                }
                Err(e) => return Err(e),
            };

        Ok(RagAnswer {
            message,
            chunks_found: 0,
            search_method,
            used_fallback,
            web_search_used,
            sources,
        })
    }

    /// Plain model answer with recent history and no retrieval
    pub async fn simple_answer(
        &self,
        message: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let prompt = prompts::build_simple_prompt(
            &self.settings.university,
            message,
            recent_turns(history, self.settings.rag_history_messages),
        );
        Ok(self.generate(prompt, false, cancel).await?.text)
    }

    async fn generate(
        &self,
        prompt: String,
        web_search: bool,
        cancel: &CancellationToken,
    ) -> Result<crate::llm::Generation> {
        let request = GenerationRequest {
            prompt,
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_output_tokens,
            web_search,
        };
        self.retry.generate(self.model.as_ref(), &request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::llm::Generation;
    use crate::models::Chunk;
    use crate::models::ChunkMetadata;
    use crate::models::KnowledgeBase;

    /// Records prompts and replays scripted results
    struct ScriptedModel {
        replies: Mutex<Vec<Result<Generation>>>,
        prompts: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<Generation>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
            self.prompts.lock().unwrap().push(request.clone());
            self.replies.lock().unwrap().remove(0)
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl QueryEmbedder for FailingEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Err(CampusRagError::EmbeddingError("offline".to_string()))
        }
    }

    fn store() -> KnowledgeStore {
        let chunk = Chunk {
            id: "dining-hinman".to_string(),
            title: "Hinman Dining".to_string(),
            category: "dining".to_string(),
            content: "Hinman dining hall is open 7am to 9pm on weekdays.".to_string(),
            keywords: vec!["hinman".to_string(), "dining".to_string()],
            metadata: ChunkMetadata::default(),
            embedding: Some(vec![1.0, 0.0]),
        };
        KnowledgeStore::from_knowledge_base(KnowledgeBase {
            version: "1".to_string(),
            last_updated: Utc::now(),
            total_chunks: 1,
            categories: ["dining".to_string()].into_iter().collect(),
            chunks: vec![chunk],
        })
    }

    fn service(model: Arc<ScriptedModel>, embedder: Option<Arc<dyn QueryEmbedder>>) -> RagService {
        RagService::new(store(), embedder, model, &AppConfig::default()).with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_keyword() {
        let model = ScriptedModel::new(vec![Ok(Generation::text("Open 7am to 9pm."))]);
        let rag = service(model.clone(), Some(Arc::new(FailingEmbedder)));

        let answer = rag
            .answer("Hinman hours", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer.search_method, SearchMethod::Keyword);
        assert_eq!(answer.chunks_found, 1);
        assert!(!answer.used_fallback);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].prompt.contains("Hinman Dining"));
        assert!(!prompts[0].web_search);
    }

    #[tokio::test]
    async fn test_history_truncated_to_six_messages() {
        let model = ScriptedModel::new(vec![Ok(Generation::text("ok"))]);
        let rag = service(model.clone(), None);
        let history: Vec<_> = (0..8)
            .map(|i| ConversationTurn::user(format!("message-{i}")))
            .collect();

        rag.answer("Hinman hours", &history, &CancellationToken::new())
            .await
            .unwrap();

        let prompt = &model.prompts.lock().unwrap()[0].prompt;
        assert!(!prompt.contains("message-0"));
        assert!(!prompt.contains("message-1"));
        assert!(prompt.contains("message-2"));
        assert!(prompt.contains("message-7"));
    }

    #[tokio::test]
    async fn test_no_chunks_uses_web_search() {
        let model = ScriptedModel::new(vec![Ok(Generation {
            text: "The game is Friday.".to_string(),
            sources: vec!["https://example.edu/athletics".to_string()],
        })]);
        let rag = service(model.clone(), None);

        let answer = rag
            .answer("basketball tickets", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(answer.web_search_used);
        assert_eq!(answer.chunks_found, 0);
        assert_eq!(answer.sources, vec!["https://example.edu/athletics"]);
        assert!(model.prompts.lock().unwrap()[0].web_search);
    }

    #[tokio::test]
    async fn test_transient_failure_uses_local_fallback() {
        let model = ScriptedModel::new(vec![Err(CampusRagError::Upstream {
            status: 503,
            message: "overloaded".to_string(),
        })]);
        let rag = service(model, None);

        let answer = rag
            .answer("Hinman hours", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(answer.used_fallback);
        assert!(answer.message.contains("Hinman Dining"));
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let model = ScriptedModel::new(vec![Err(CampusRagError::Upstream {
            status: 403,
            message: "API key not valid".to_string(),
        })]);
        let rag = service(model, None);

        let result = rag.answer("Hinman hours", &[], &CancellationToken::new()).await;
        assert!(matches!(result, Err(CampusRagError::Upstream { status: 403, .. })));
    }
}
