// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry logic for LLM API calls with exponential backoff

use crate::config::settings::ResilienceConfig;
use crate::error::{AgentError, ApiError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Upper bound honored for a provider-supplied `retry-after`
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay in milliseconds (exponentially increased)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^attempt
        let exponential_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = exponential_ms.min(self.max_delay_ms);

        let jitter_range = (capped_ms as f64 * self.jitter) as i64;
        let jitter_ms = if jitter_range > 0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        let final_ms = (capped_ms as i64 + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms)
    }

    /// Delay before the next attempt, honoring a server `retry-after`
    fn delay_for(&self, error: &AgentError, attempt: u32) -> Duration {
        match error {
            AgentError::Api(ApiError::RateLimited(secs)) if *secs > 0 => {
                Duration::from_secs((*secs as u64).min(MAX_RETRY_AFTER_SECS))
            }
            _ => self.calculate_delay(attempt),
        }
    }
}

/// Determine if an error is retryable
pub fn is_retryable(error: &AgentError) -> bool {
    match error {
        AgentError::Api(api_error) => match api_error {
            // Retry on transient failures
            ApiError::Network(_) => true,
            ApiError::RateLimited(_) => true,
            ApiError::Timeout => true,
            // 5xx, including Anthropic's 529 "overloaded"
            ApiError::ServerError { status, .. } => (500..600).contains(status),
            ApiError::StreamError(_) => true,

            // Don't retry on client errors
            ApiError::AuthenticationFailed(_) => false,
            ApiError::ModelNotFound(_) => false,
            ApiError::ContextTooLong { .. } => false,
            ApiError::InvalidResponse(_) => false,
        },
        _ => false,
    }
}

/// Retry an operation with exponential backoff, calling `on_retry(error, attempt, delay)` before each
/// backoff sleep so callers can surface progress.
pub async fn with_retry_notify<F, Fut, T, N>(
    mut operation: F,
    config: Option<RetryConfig>,
    operation_name: &str,
    mut on_retry: N,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(&AgentError, u32, Duration),
{
    let config = config.unwrap_or_default();
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        target: "mercury_agent::llm::retry",
                        operation = operation_name,
                        attempts = attempt + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!(
                        target: "mercury_agent::llm::retry",
                        operation = operation_name,
                        error = %error,
                        "non-retryable error"
                    );
                    return Err(error);
                }

                if attempt >= config.max_retries {
                    tracing::warn!(
                        target: "mercury_agent::llm::retry",
                        operation = operation_name,
                        max_retries = config.max_retries,
                        error = %error,
                        "retries exhausted"
                    );
                    return Err(error);
                }

                let delay = config.delay_for(&error, attempt);
                tracing::warn!(
                    target: "mercury_agent::llm::retry",
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure; retrying"
                );
                on_retry(&error, attempt + 1, delay);

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
