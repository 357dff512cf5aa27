//! Retrying wrapper around `LlmClient::generate`
//!
//! Transient failures (timeout, rate limit, transport) are retried with
//! exponential backoff up to `ai.max_retries`; rate-limited calls wait at
//! least `ai.rate_limit_delay`. Invalid responses get a single silent retry
//! before being surfaced so the caller can fall back.

use crate::client::LlmClient;
use crate::types::{LlmError, LlmOptions, LlmResponse, LlmResult};
use counsel_core::{AiSettings, RateLimiter};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy derived from the `ai.*` settings
#[derive(Debug, Clone)]
pub struct LlmRetryPolicy {
    pub max_retries: usize,
    /// Seconds before the first retry
    pub retry_delay: f64,
    /// Minimum wait after a rate-limit response, in seconds
    pub rate_limit_delay: f64,
    pub backoff_base: f64,
}

impl Default for LlmRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: 1.0,
            rate_limit_delay: 2.0,
            backoff_base: 2.0,
        }
    }
}

impl From<&AiSettings> for LlmRetryPolicy {
    fn from(settings: &AiSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
            rate_limit_delay: settings.rate_limit_delay,
            backoff_base: settings.exponential_backoff_base,
        }
    }
}

impl LlmRetryPolicy {
    /// Backoff before retry `attempt` (0-based): `retry_delay * base^attempt`
    fn backoff(&self, attempt: usize) -> Duration {
        let secs = self.retry_delay * self.backoff_base.powi(attempt as i32);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Generate with retries; returns the last error once attempts are exhausted.
///
/// The optional rate limiter serializes access to the shared client and
/// enforces the configured minimum interval between invocations.
pub async fn generate_with_retry(
    client: &dyn LlmClient,
    prompt: &str,
    options: &LlmOptions,
    policy: &LlmRetryPolicy,
    limiter: Option<&RateLimiter>,
) -> LlmResult<LlmResponse> {
    let mut invalid_retried = false;
    let mut attempt = 0;

    loop {
        let _guard = match limiter {
            Some(limiter) => match limiter.acquire().await {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!(error = %e, "Rate limiter unavailable, proceeding without it");
                    None
                }
            },
            None => None,
        };

        match client.generate(prompt, options).await {
            Ok(response) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "LLM call succeeded after retry");
                }
                return Ok(response);
            }
            Err(LlmError::InvalidResponse { reason }) => {
                if invalid_retried {
                    return Err(LlmError::InvalidResponse { reason });
                }
                warn!(reason = %reason, "Invalid LLM response, retrying once");
                invalid_retried = true;
                continue;
            }
            Err(err) if err.is_transient() => {
                attempt += 1;
                if attempt >= policy.max_retries {
                    warn!(
                        attempts = attempt,
                        error = %err,
                        "LLM call failed after all retry attempts"
                    );
                    return Err(err);
                }

                let delay = match &err {
                    LlmError::RateLimit { retry_after_ms, .. } => retry_after_ms
                        .map(Duration::from_millis)
                        .unwrap_or_else(|| Duration::from_secs_f64(policy.rate_limit_delay))
                        .max(Duration::from_secs_f64(policy.rate_limit_delay)),
                    _ => policy.backoff(attempt - 1),
                };

                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient LLM failure, backing off"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
