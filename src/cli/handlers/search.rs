//! Retrieval inspection handlers

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::output::print_search_results;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::QueryEmbedder;
use crate::knowledge::KnowledgeStore;
use crate::llm::GeminiClient;
use crate::llm::LanguageModel;
use crate::models::ConversationTurn;
use crate::rag::KeywordRanker;
use crate::rag::QueryExpander;
use crate::rag::RagService;
use crate::rag::SearchMethod;
use crate::AppConfig;
use crate::Result;

/// Rank knowledge-base chunks for a query
pub async fn handle_search(
    mut config: AppConfig,
    query: String,
    keyword: bool,
    limit: Option<usize>,
) -> Result<()> {
    if let Some(limit) = limit {
        config.retrieval.top_k = limit;
    }
    let knowledge = KnowledgeStore::load(&config.knowledge.knowledge_base_path).await?;

    if keyword || !knowledge.has_embeddings() || config.llm.api_key.is_empty() {
        let expanded = QueryExpander.expand(&query, &[]);
        let results = KeywordRanker.rank(&expanded, knowledge.chunks(), config.retrieval.top_k);
        print_search_results(&expanded, SearchMethod::Keyword, &results);
        return Ok(());
    }

    let embedder: Arc<dyn QueryEmbedder> = Arc::new(EmbeddingClient::new(&config.llm)?);
    let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(&config.llm)?);
    let rag = RagService::new(knowledge, Some(embedder), model, &config);

    let retrieval = rag.retrieve(&query, &[], &CancellationToken::new()).await?;
    print_search_results(&retrieval.expanded_query, retrieval.method, &retrieval.results);
    Ok(())
}

/// Print the search query a message expands to
pub fn handle_expand(message: &str, history: &[String]) {
    let turns: Vec<ConversationTurn> = history.iter().map(ConversationTurn::user).collect();
    let expanded = QueryExpander.expand(message, &turns);

    println!("📝 Message:  {message}");
    if !turns.is_empty() {
        println!("🕘 History:  {} turns", turns.len());
    }
    println!("🔍 Expanded: {expanded}");
}
