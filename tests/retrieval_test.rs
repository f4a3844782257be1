mod common;

use std::sync::Arc;

use campusrag::embeddings::QueryEmbedder;
use campusrag::knowledge::KnowledgeStore;
use campusrag::models::ConversationTurn;
use campusrag::rag::RagService;
use campusrag::rag::SearchMethod;
use campusrag::Result;
use common::data_path;
use common::test_config;
use common::FixedEmbedder;
use common::ScriptedModel;
use tokio_util::sync::CancellationToken;

async fn bundled_knowledge() -> Result<KnowledgeStore> {
    KnowledgeStore::load(data_path("knowledge_base.json")).await
}

#[tokio::test]
async fn test_hinman_hours_end_to_end() -> Result<()> {
    let model = ScriptedModel::answering(
        "Hinman Dining Hall is open 7:00 AM to 9:00 PM on weekdays and 10:00 AM to 8:00 PM on weekends.",
    );
    let rag = RagService::new(bundled_knowledge().await?, None, model.clone(), &test_config());

    let answer = rag
        .answer("What are the Hinman dining hall hours?", &[], &CancellationToken::new())
        .await?;

    assert!(answer.message.contains("7:00 AM"));
    assert_eq!(answer.search_method, SearchMethod::Keyword);
    assert!(answer.chunks_found >= 1);
    assert_eq!(answer.sources[0], "Hinman Dining Hall");
    assert!(!answer.used_fallback);
    assert!(!answer.web_search_used);

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].web_search);
    assert!(requests[0].prompt.contains("Monday to Friday 7:00 AM to 9:00 PM"));
    Ok(())
}

#[tokio::test]
async fn test_vector_search_ranks_by_embedding() -> Result<()> {
    let mut kb = bundled_knowledge().await?.knowledge_base().clone();
    for chunk in &mut kb.chunks {
        chunk.embedding = Some(match chunk.id.as_str() {
            "dining-hinman" => vec![1.0, 0.0, 0.0],
            "dining-c4" => vec![0.6, 0.8, 0.0],
            _ => vec![0.0, 0.0, 1.0],
        });
    }
    let embedder: Arc<dyn QueryEmbedder> = Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0]));
    let rag = RagService::new(
        KnowledgeStore::from_knowledge_base(kb),
        Some(embedder),
        ScriptedModel::answering("unused"),
        &test_config(),
    );

    let retrieval = rag
        .retrieve("where can I eat", &[], &CancellationToken::new())
        .await?;

    assert_eq!(retrieval.method, SearchMethod::Vector);
    let ids: Vec<&str> = retrieval.results.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["dining-hinman", "dining-c4"]);
    assert!((retrieval.results[0].score - 1.0).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn test_follow_up_question_uses_course_from_history() -> Result<()> {
    let model = ScriptedModel::answering("It meets in Engineering Building G-11.");
    let rag = RagService::new(bundled_knowledge().await?, None, model.clone(), &test_config());
    let history = vec![
        ConversationTurn::user("Tell me about CS 515"),
        ConversationTurn::bot("CS 515 is Computer Networks."),
    ];

    let retrieval = rag
        .retrieve("where is it held?", &history, &CancellationToken::new())
        .await?;

    assert!(retrieval.expanded_query.starts_with("CS 515"));
    assert_eq!(retrieval.results[0].chunk.id, "course-cs515");
    Ok(())
}

#[tokio::test]
async fn test_unmatched_question_goes_to_web_search() -> Result<()> {
    let model = ScriptedModel::answering("The next home game is on Saturday.");
    let rag = RagService::new(bundled_knowledge().await?, None, model.clone(), &test_config());

    let answer = rag
        .answer("zzz qqq xyzzy", &[], &CancellationToken::new())
        .await?;

    assert_eq!(answer.chunks_found, 0);
    assert!(answer.web_search_used);
    assert!(model.requests()[0].web_search);
    Ok(())
}
