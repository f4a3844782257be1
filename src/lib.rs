//! campusrag: a university campus chat assistant
//!
//! Answers student questions from a local knowledge base of course and
//! dining data, with a three-tier cascade (internal documents, model
//! knowledge, web search) behind a rate-limited, cached HTTP API.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod models;
pub mod rag;


pub use config::AppConfig;
pub use errors::*;
