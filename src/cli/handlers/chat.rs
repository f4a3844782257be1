//! Chat against a running server through the API router

use std::io::BufRead;

use tokio_util::sync::CancellationToken;

use crate::cli::output::print_error;
use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_prompt;
use crate::cli::output::print_warning;
use crate::client::ChatClient;
use crate::client::ChatReply;
use crate::client::Endpoint;
use crate::AppConfig;
use crate::CampusRagError;
use crate::Result;

/// Send one message, or run an interactive session when `message` is `None`
pub async fn handle_chat(config: &AppConfig, server: &str, message: Option<String>) -> Result<()> {
    let mut client = ChatClient::new(
        server,
        config.router.clone(),
        config.llm.request_timeout_secs,
    )?;

    if let Some(message) = message {
        let reply = client.send(&message, &CancellationToken::new()).await?;
        print_reply(&reply);
        return Ok(());
    }

    print_info(&format!(
        "Chatting with {} at {server}. Type 'exit' to quit, 'clear' to reset history.",
        config.assistant.university_name
    ));

    loop {
        print_prompt("\nYou: ");
        let Some(line) = read_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                client.clear_history();
                print_success("History cleared");
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let result = tokio::select! {
            result = client.send(line, &cancel) => result,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                Err(CampusRagError::Cancelled)
            }
        };

        match result {
            Ok(reply) => print_reply(&reply),
            Err(CampusRagError::Cancelled) => print_warning("Cancelled"),
            Err(e) => print_error(&e.to_string()),
        }
    }

    Ok(())
}

fn print_reply(reply: &ChatReply) {
    println!("\nAssistant: {}", reply.message);
    if reply.endpoint == Endpoint::Simple {
        print_warning("Answered without campus data (fallback endpoint)");
    }
    if reply.cached {
        print_info("(cached)");
    }
}

async fn read_line() -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
    .await
    .map_err(|e| CampusRagError::Custom(format!("stdin reader failed: {e}")))??;
    Ok(line)
}
