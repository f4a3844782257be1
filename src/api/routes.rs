//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers::AppState;
use super::handlers::{
    self,
};

/// Create RESTful API router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Chat endpoints
        .route("/chat", post(handlers::chat))
        .route("/chat/tiered", post(handlers::tiered_chat))
        .route("/chat/simple", post(handlers::simple_chat))
        // Quota and cache usage
        .route("/usage", get(handlers::usage))
        .with_state(state)
}
