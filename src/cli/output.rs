//! CLI output formatting utilities
//!
//! This module provides consistent output formatting for the `campusrag` CLI

use crate::api::rate_limit::UsageSnapshot;
use crate::api::rate_limit::WindowUsage;
use crate::rag::RankedChunk;
use crate::rag::SearchMethod;
use crate::rag::tiered::TierFailure;

/// Safely truncate a string at character boundary (not byte boundary)
///
/// This prevents panics when truncating strings with multi-byte UTF-8 characters (emojis, etc.)
///
/// # Arguments
/// * `s` - The string to truncate
/// * `max_chars` - Maximum number of characters (not bytes)
///
/// # Returns
/// Truncated string with "..." suffix if truncated, otherwise the original string
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Print ranked chunks
pub fn print_search_results(query: &str, method: SearchMethod, results: &[RankedChunk<'_>]) {
    println!("🔍 Query: \"{query}\" ({method:?} search)");
    if results.is_empty() {
        print_warning("No matching chunks");
        return;
    }

    println!("Found {} chunks:\n", results.len());
    for (idx, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {} (score: {:.3}, {:?})",
            idx + 1,
            result.chunk.category,
            result.chunk.title,
            result.score,
            result.match_type
        );
        if !result.matched_terms.is_empty() {
            println!("   matched: {}", result.matched_terms.join(", "));
        }
        println!("   {}", truncate_str(&result.chunk.content, 160));
    }
}

/// Print how a tiered answer was reached
pub fn print_tier_summary(tier: u8, tier_name: &str, failures: &[TierFailure]) {
    println!();
    println!("📊 Answered by tier {tier} ({tier_name})");
    for failure in failures {
        println!(
            "   tier {} ({}) skipped: {:?}",
            failure.tier, failure.tier_name, failure.reason
        );
    }
}

/// Print rate-limit usage
pub fn print_usage(usage: &UsageSnapshot) {
    println!("📈 API Usage ({})", usage.current_day);
    println!();
    print_window("Today", &usage.today, usage.warnings.near_daily_limit);
    print_window("This minute", &usage.this_minute, usage.warnings.near_minute_limit);
    println!();
    println!("  Total requests: {}", usage.total_requests);
    if let Some(first) = &usage.first_request_date {
        println!("  First request: {first}");
    }
    if !usage.persistent {
        print_warning("Usage is not persisted; counters reset on restart");
    }
}

fn print_window(label: &str, window: &WindowUsage, near_limit: bool) {
    println!(
        "  {label}: {}/{} ({:.1}%), {} remaining{}",
        window.used,
        window.limit,
        window.percentage,
        window.remaining,
        if near_limit { " ⚠️" } else { "" }
    );
}

/// Print colored output functions
pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    println!("❌ {msg}");
}

pub fn print_prompt(msg: &str) {
    print!("{msg}");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_multibyte() {
        assert_eq!(truncate_str("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("🍕🍕🍕", 2), "🍕🍕...");
    }
}
