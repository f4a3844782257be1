//! HTTP server implementation

use std::time::Duration;

use axum::Router;
use chrono::Utc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::Result;

/// Build the full application router around prepared state
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let max_concurrent = state.config.server.max_concurrent_requests;
    let mut app = Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the API server
///
/// Runs until Ctrl-C; in-flight requests finish before returning.
pub async fn serve_api(config: AppConfig, host: String, port: u16, enable_cors: bool) -> Result<()> {
    info!("🚀 Starting CampusRAG API server...");

    let university = config.assistant.university_name.clone();
    let state = AppState::from_config(config).await?;
    info!(
        "📚 Knowledge base v{} loaded: {} chunks ({} with embeddings)",
        state.rag.knowledge().knowledge_base().version,
        state.rag.knowledge().len(),
        state.rag.knowledge().knowledge_base().embedded_count()
    );

    spawn_cache_sweeper(state.clone());

    let app = build_router(state, enable_cors);
    if enable_cors {
        info!("✅ CORS enabled");
    }

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 {university} assistant listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health       - Health check");
    info!("  POST /api/chat         - Knowledge base chat");
    info!("  POST /api/chat/tiered  - Three-tier chat");
    info!("  POST /api/chat/simple  - Chat without retrieval");
    info!("  GET  /api/usage        - Quota and cache usage");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

/// Periodically evict expired cache entries that are never looked up again
fn spawn_cache_sweeper(state: AppState) {
    let period = Duration::from_secs(state.config.cache.ttl_secs.max(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = state.sweep_expired_at(Utc::now());
            if removed > 0 {
                debug!("Evicted {removed} expired cached responses");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
