//! Prompt templates for campus questions

use crate::models::ConversationTurn;
use crate::models::TurnRole;

/// Exact reply meaning "the supplied documents do not answer this"
pub const INSUFFICIENT_CONTEXT_SENTINEL: &str = "INSUFFICIENT_CONTEXT";

/// Exact reply meaning "this needs live or current information"
pub const NEEDS_CURRENT_INFO_SENTINEL: &str = "NEEDS_CURRENT_INFO";

pub const UNAVAILABLE_APOLOGY: &str = "I'm sorry, I'm having trouble answering right now. \
Please try again in a moment.";

pub const TIERS_EXHAUSTED_APOLOGY: &str = "I'm sorry, I couldn't find a reliable answer to that \
question. Please try rephrasing it, or check the university website directly.";

/// Serialize history as alternating `User:` / `Assistant:` lines, oldest first
pub fn format_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Bot => "Assistant",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn history_block(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        String::new()
    } else {
        format!("Previous conversation:\n{}\n\n", format_history(history))
    }
}

/// Build the single-tier RAG chat prompt
pub fn build_rag_prompt(
    university: &str,
    question: &str,
    context: &str,
    history: &[ConversationTurn],
) -> String {
    let history = history_block(history);
    format!(
        r"You are a friendly, knowledgeable campus assistant for {university}. You help students with courses, schedules, dining and campus life.

Relevant information from the campus knowledge base:
{context}

{history}Current question: {question}

Instructions:
1. Answer using the information above when it is relevant
2. Mention course numbers, times and locations exactly as given
3. If the information above does not cover the question, say so and answer from general knowledge carefully
4. Be concise and conversational

Answer:"
    )
}

/// Build the plain prompt used when no retrieval is attempted
pub fn build_simple_prompt(university: &str, question: &str, history: &[ConversationTurn]) -> String {
    let history = history_block(history);
    format!(
        r"You are a friendly campus assistant for {university}.

{history}Current question: {question}

Answer helpfully and concisely. If you are not sure about campus-specific details, say so.

Answer:"
    )
}

/// Build the internal-documents prompt; the model must answer only from context
pub fn build_internal_documents_prompt(
    university: &str,
    question: &str,
    context: &str,
    history: &[ConversationTurn],
) -> String {
    let history = history_block(history);
    format!(
        r"You are a campus assistant for {university}. Answer the question strictly using the course documents below.

Course documents:
{context}

{history}Question: {question}

Rules:
1. Use ONLY the documents above. Do not use outside knowledge.
2. Cite the document name when you use it.
3. If the documents do not contain enough information to answer, reply with exactly {INSUFFICIENT_CONTEXT_SENTINEL} and nothing else.

Answer:"
    )
}

/// Build the model-knowledge prompt; the model must opt out for current events
pub fn build_model_knowledge_prompt(
    university: &str,
    question: &str,
    history: &[ConversationTurn],
) -> String {
    let history = history_block(history);
    format!(
        r"You are a campus assistant for {university}. Answer the question from your general knowledge.

{history}Question: {question}

Rules:
1. Answer only if you are confident the answer does not depend on recent or live information.
2. If the question needs current information (today's hours, events, news, weather, deadlines this term) or you are unsure, reply with exactly {NEEDS_CURRENT_INFO_SENTINEL} and nothing else.

Answer:"
    )
}

/// Build the prompt for search-grounded generation
pub fn build_web_search_prompt(
    university: &str,
    question: &str,
    history: &[ConversationTurn],
) -> String {
    let history = history_block(history);
    format!(
        r"You are a campus assistant for {university}. Use Google Search to find current, accurate information to answer the question. Prefer official {university} sources.

{history}Question: {question}

Give a concise answer with the key facts (dates, times, locations).

Answer:"
    )
}

/// Whether a model reply is exactly the given sentinel
pub fn is_sentinel(reply: &str, sentinel: &str) -> bool {
    reply.trim() == sentinel
}
