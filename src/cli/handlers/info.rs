//! Information display handlers

use crate::api::rate_limit::read_state;
use crate::api::rate_limit::RateLimiter;
use crate::cli::output::print_usage;
use crate::cli::output::print_warning;
use crate::AppConfig;
use crate::Result;

/// Show usage from the persisted rate-limit state
pub fn handle_usage(config: &AppConfig) -> Result<()> {
    let Some(path) = &config.rate_limit.state_path else {
        print_warning("rate_limit.state_path is not set; usage is only tracked in a running server");
        return Ok(());
    };
    if read_state(path)?.is_none() {
        print_warning(&format!("No usage recorded yet at {}", path.display()));
    }

    let limiter = RateLimiter::new(config.rate_limit.clone());
    print_usage(&limiter.usage());
    Ok(())
}

/// Show the effective configuration with secrets masked
pub fn handle_config(config: &AppConfig) -> Result<()> {
    println!("📋 CampusRAG Configuration:");
    println!();
    println!("{}", config.to_redacted_toml()?);
    if config.llm.api_key.is_empty() {
        print_warning("llm.api_key is empty; set CAMPUSRAG__LLM__API_KEY");
    }
    Ok(())
}
