//! API server handlers

use crate::cli::output::print_warning;
use crate::AppConfig;
use crate::Result;

pub async fn handle_serve_api(
    config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    cors: Option<bool>,
) -> Result<()> {
    use crate::api::serve_api;

    // CLI arguments take priority over config
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let cors = cors.unwrap_or(config.server.enable_cors);

    println!("🚀 Starting CampusRAG API Server");
    println!("================================\n");
    println!("🎓 University: {}", config.assistant.university_name);
    println!("🤖 Model: {}", config.llm_model());
    println!("📍 Host: {host}");
    println!("🔌 Port: {port}");
    println!("🌐 CORS: {}", if cors { "Enabled" } else { "Disabled" });
    println!(
        "🚦 Limits: {}/min, {}/day, {}ms between requests",
        config.rate_limit.requests_per_minute,
        config.rate_limit.requests_per_day,
        config.rate_limit.min_interval_ms
    );
    if config.rate_limit.state_path.is_none() {
        print_warning("Rate-limit counters are kept in memory only");
    }
    println!();

    serve_api(config, host, port, cors).await
}
