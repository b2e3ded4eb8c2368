use crate::error::{GatewayError, Result};
use crate::types::CompletionRequest;
use crate::CompletionGateway;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout and retry budget for a single logical completion call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Backoff before the second attempt; doubles after each retry
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 60,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before attempt `attempt + 1` (attempts are 1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

/// Wraps a gateway with a per-attempt timeout and bounded retries.
///
/// Only errors with [`GatewayError::is_retryable`] are retried; auth and
/// configuration failures surface immediately.
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: CompletionGateway> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: CompletionGateway> CompletionGateway for RetryingGateway<G> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.timeout();
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(timeout, self.inner.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.policy.backoff(attempt);
                    log::warn!(
                        "Completion attempt {attempt}/{attempts} failed: {err}; retrying in {} ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        log::error!("Completion failed after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}
