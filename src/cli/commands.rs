//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "campusrag")]
#[command(about = "Campus chat assistant: knowledge-base answers with tiered fallback")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable CORS (overrides config)
        #[arg(long)]
        cors: Option<bool>,
    },
    /// Answer one question locally through the three tiers (Ctrl-C cancels)
    Ask {
        /// The question
        message: String,
        /// Use the knowledge-base RAG pipeline instead of the tiers
        #[arg(long)]
        rag: bool,
    },
    /// Rank knowledge-base chunks for a query without calling the model
    Search {
        /// Search query
        query: String,
        /// Force keyword ranking even when embeddings are available
        #[arg(long)]
        keyword: bool,
        /// Maximum number of results (overrides config top_k)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show how a message is rewritten into a search query
    Expand {
        /// The message to expand
        message: String,
        /// Earlier user messages, oldest first
        #[arg(long = "history")]
        history: Vec<String>,
    },
    /// Chat with a running server; starts an interactive session without a message
    Chat {
        /// Send a single message and exit
        message: Option<String>,
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,
    },
    /// Show persisted rate-limit usage
    Usage,
    /// Show the effective configuration
    Config,
}
