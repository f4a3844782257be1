//! One-shot question answering without a server

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::rate_limit::Admission;
use crate::api::AppState;
use crate::cli::output::print_error;
use crate::cli::output::print_info;
use crate::cli::output::print_tier_summary;
use crate::cli::output::print_warning;
use crate::errors::UpstreamErrorKind;
use crate::rag::tiered::TierRequest;
use crate::AppConfig;
use crate::CampusRagError;
use crate::Result;

/// Answer a question through the tiers, or the RAG pipeline with `rag`.
///
/// The request counts against the same quota as the server. Ctrl-C cancels
/// any in-flight model call.
pub async fn handle_ask(config: AppConfig, message: String, rag: bool) -> Result<()> {
    let message = message.trim().to_string();
    if message.is_empty() {
        return Err(CampusRagError::InvalidRequest(
            "Message is required".to_string(),
        ));
    }

    let state = AppState::from_config(config).await?;

    match state.rate_limiter.try_acquire() {
        Admission::Admitted(remaining) => {
            debug!("{} requests left today", remaining.today);
        }
        Admission::Denied { reason, .. } => {
            print_warning(reason.message());
            return Ok(());
        }
        Admission::Throttled { wait_time_ms } => {
            print_warning(&format!("Please wait {wait_time_ms}ms before asking again"));
            return Ok(());
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    print_info(&format!("🤔 {message}"));
    let result = if rag {
        ask_rag(&state, &message, &cancel).await
    } else {
        ask_tiered(&state, &message, &cancel).await
    };
    ctrl_c.abort();

    match result {
        Err(CampusRagError::Cancelled) => {
            print_warning("Cancelled");
            Ok(())
        }
        other => other,
    }
}

async fn ask_tiered(state: &AppState, message: &str, cancel: &CancellationToken) -> Result<()> {
    let request = TierRequest::new(message, Vec::new());
    let mut response = state.tiered.answer(&request, cancel).await?;

    if response.is_fallback() {
        if let Some(err) = response.last_error.take() {
            if err.upstream_kind() != UpstreamErrorKind::Other {
                print_error(&err.to_string());
            }
        }
    }

    println!("\n{}", response.message);
    if let Some(answer) = &response.answer {
        for source in &answer.sources {
            println!("   🔗 {source}");
        }
    }
    print_tier_summary(response.tier, &response.tier_name, &response.failures);
    Ok(())
}

async fn ask_rag(state: &AppState, message: &str, cancel: &CancellationToken) -> Result<()> {
    let answer = state.rag.answer(message, &[], cancel).await?;

    println!("\n{}", answer.message);
    println!();
    println!(
        "📊 {} chunks via {:?} search{}{}",
        answer.chunks_found,
        answer.search_method,
        if answer.web_search_used { ", web search" } else { "" },
        if answer.used_fallback { ", fallback answer" } else { "" }
    );
    for source in &answer.sources {
        println!("   📄 {source}");
    }
    Ok(())
}
