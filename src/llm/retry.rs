//! Exponential backoff for transient model failures

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetryConfig;
use crate::errors::CampusRagError;
use crate::errors::Result;
use crate::llm::Generation;
use crate::llm::GenerationRequest;
use crate::llm::LanguageModel;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors where [`CampusRagError::is_transient`] holds are retried.
    /// Cancellation is checked before every attempt and interrupts the backoff
    /// sleep.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(CampusRagError::Cancelled);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "Transient model error (attempt {attempt}/{}), retrying in {delay:?}: {e}",
                        self.max_attempts
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(CampusRagError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// [`LanguageModel::generate`] under this policy
    pub async fn generate(
        &self,
        model: &dyn LanguageModel,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        self.run(cancel, || model.generate(request)).await
    }
}
