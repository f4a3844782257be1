//! Endpoint selection between the RAG chat and the simple fallback
//!
//! The router counts recent RAG failures. Once `failure_threshold` of them
//! land inside `failure_window_secs`, every request goes to the simple
//! endpoint for `cooldown_secs`, after which RAG is tried again from a clean
//! slate. All methods take the current time so the state machine can be
//! driven deterministically.

use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::config::RouterConfig;

/// Server endpoint a chat message is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Rag,
    Simple,
}

impl Endpoint {
    /// Path relative to the server's base URL
    pub const fn path(self) -> &'static str {
        match self {
            Self::Rag => "api/chat",
            Self::Simple => "api/chat/simple",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRouter {
    config: RouterConfig,
    failures: VecDeque<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl ApiRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            failures: VecDeque::new(),
            cooldown_until: None,
        }
    }

    pub fn choose(&mut self) -> Endpoint {
        self.choose_at(Utc::now())
    }

    /// Pick the endpoint for a request made at `now`
    pub fn choose_at(&mut self, now: DateTime<Utc>) -> Endpoint {
        match self.cooldown_until {
            Some(until) if now < until => Endpoint::Simple,
            Some(_) => {
                info!("RAG cooldown over, routing back to the RAG endpoint");
                self.cooldown_until = None;
                self.failures.clear();
                Endpoint::Rag
            }
            None => Endpoint::Rag,
        }
    }

    pub fn record_success(&mut self, endpoint: Endpoint) {
        if endpoint == Endpoint::Rag {
            self.failures.clear();
        }
    }

    pub fn record_failure(&mut self, endpoint: Endpoint) {
        self.record_failure_at(endpoint, Utc::now());
    }

    /// Count a failure; only RAG failures can trigger the cooldown
    pub fn record_failure_at(&mut self, endpoint: Endpoint, now: DateTime<Utc>) {
        if endpoint != Endpoint::Rag {
            return;
        }

        let window = Duration::seconds(secs_i64(self.config.failure_window_secs));
        while self.failures.front().is_some_and(|t| now - *t >= window) {
            self.failures.pop_front();
        }
        self.failures.push_back(now);

        if self.failures.len() >= self.config.failure_threshold {
            let until = now + Duration::seconds(secs_i64(self.config.cooldown_secs));
            warn!(
                "{} RAG failures within {}s, using the simple endpoint until {}",
                self.failures.len(),
                self.config.failure_window_secs,
                until
            );
            self.cooldown_until = Some(until);
            self.failures.clear();
        }
    }

    pub fn is_cooling_down_at(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// RAG failures currently inside the window
    pub fn recent_failures(&self) -> usize {
        self.failures.len()
    }
}

fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX / 1000)
}
