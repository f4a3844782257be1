//! CLI command handlers module
//!
//! This module is organized by functional domains:
//! - serve: API server
//! - ask: one-shot local answers
//! - search: retrieval and query expansion without the model
//! - chat: HTTP client against a running server
//! - info: usage and configuration display

pub mod ask;
pub mod chat;
pub mod info;
pub mod search;
pub mod serve;

// Re-export all public handlers
pub use ask::*;
pub use chat::*;
pub use info::*;
pub use search::*;
pub use serve::*;
