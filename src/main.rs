use anyhow::Context;
use campusrag::cli::handle_ask;
use campusrag::cli::handle_chat;
use campusrag::cli::handle_config;
use campusrag::cli::handle_expand;
use campusrag::cli::handle_search;
use campusrag::cli::handle_serve_api;
use campusrag::cli::handle_usage;
use campusrag::cli::Cli;
use campusrag::cli::Commands;
use campusrag::AppConfig;
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::load().context("loading configuration")?,
    };

    // Initialize logging
    if cli.verbose {
        campusrag::logging::init_logging_with_level("debug")?;
    } else {
        campusrag::logging::init_logging_with_config(Some(&config))?;
    }
    info!("Configuration loaded successfully");

    // Execute the requested command
    match cli.command {
        Commands::Serve { host, port, cors } => {
            config.validate().context("invalid configuration")?;
            handle_serve_api(config, host, port, cors).await?;
        }
        Commands::Ask { message, rag } => {
            config.validate().context("invalid configuration")?;
            handle_ask(config, message, rag).await?;
        }
        Commands::Search {
            query,
            keyword,
            limit,
        } => {
            handle_search(config, query, keyword, limit).await?;
        }
        Commands::Expand { message, history } => {
            handle_expand(&message, &history);
        }
        Commands::Chat { message, server } => {
            handle_chat(&config, &server, message).await?;
        }
        Commands::Usage => {
            handle_usage(&config)?;
        }
        Commands::Config => {
            handle_config(&config)?;
        }
    }

    Ok(())
}
