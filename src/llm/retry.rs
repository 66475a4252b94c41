//! Exponential backoff for transient LLM failures.
//!
//! DESIGN
//! ======
//! `retry_with_backoff` is generic over any error implementing
//! [`ErrorCode`]; the error decides whether it is worth another attempt.
//! `RetryingLlm` wraps an `LlmChat` so every AI operation gets the same
//! policy without the service layer knowing about it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::types::{ChatResponse, LlmChat, LlmError, Message};
use crate::error::ErrorCode;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Load from `AI_RETRY_MAX_ATTEMPTS`, `AI_RETRY_INITIAL_DELAY_MS`,
    /// `AI_RETRY_MAX_DELAY_MS` and `AI_RETRY_MULTIPLIER`.
    #[must_use]
    pub fn from_env() -> Self {
        let multiplier = crate::config::env_parse("AI_RETRY_MULTIPLIER", DEFAULT_MULTIPLIER);
        Self {
            max_attempts: crate::config::env_parse("AI_RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).max(1),
            initial_delay: Duration::from_millis(crate::config::env_parse("AI_RETRY_INITIAL_DELAY_MS", DEFAULT_INITIAL_DELAY_MS)),
            max_delay: Duration::from_millis(crate::config::env_parse("AI_RETRY_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS)),
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 { multiplier } else { DEFAULT_MULTIPLIER },
        }
    }

    /// Delay before retry number `retry` (0 = first retry).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(i32::try_from(retry).unwrap_or(i32::MAX));
        // Past the cap, or a factor `Duration` cannot represent.
        if !factor.is_finite() || self.initial_delay.as_secs_f64() * factor >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: ErrorCode,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    code = err.error_code(),
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// =============================================================================
// DECORATOR
// =============================================================================

/// `LlmChat` decorator applying a [`RetryPolicy`] to every call.
pub struct RetryingLlm {
    inner: Arc<dyn LlmChat>,
    policy: RetryPolicy,
}

impl RetryingLlm {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmChat>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl LlmChat for RetryingLlm {
    async fn chat(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        retry_with_backoff(&self.policy, move || self.inner.chat(max_tokens, system, messages)).await
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
