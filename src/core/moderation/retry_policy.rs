// Retry policy for provider calls.
//
// - Rate limit: wait (provider hint or default, capped at
//   `max_rate_limit_wait`) and try again; on the last attempt give up with
//   `RateLimitExhausted`.
// - Other transient errors: wait `attempt * base_delay` and try again.
// - Non-retryable errors (configuration, not implemented) return immediately.
// - After the final attempt the last error is returned, never swallowed.

use super::moderation_models::{ModerationVerdict, ProviderKind};
use super::moderation_provider::{ModerationError, ModerationProvider};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff unit for transient failures
    pub base_delay: Duration,
    /// Wait used when a rate-limit response carries no retry-after hint
    pub rate_limit_wait: Duration,
    /// Upper bound on any rate-limit wait, including provider hints
    pub max_rate_limit_wait: Duration,
}

/// Longest a provider's Retry-After hint may hold up a moderation job.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_provider(ProviderKind::BinaryFlag)
    }
}

impl RetryPolicy {
    /// Reference policy for a provider: 3 attempts with its default delays.
    pub fn for_provider(kind: ProviderKind) -> Self {
        Self {
            max_attempts: 3,
            base_delay: kind.default_backoff_base(),
            rate_limit_wait: kind.default_rate_limit_wait(),
            max_rate_limit_wait: DEFAULT_MAX_RATE_LIMIT_WAIT,
        }
    }

    /// Policy that never sleeps. Useful for tests and one-shot tooling.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            rate_limit_wait: Duration::ZERO,
            max_rate_limit_wait: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Wait before retrying a rate-limited call.
    pub fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.rate_limit_wait)
            .min(self.max_rate_limit_wait)
    }

    /// Call the provider under this policy.
    pub async fn run<P>(&self, provider: &P, text: &str) -> Result<ModerationVerdict, ModerationError>
    where
        P: ModerationProvider + ?Sized,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match provider.moderate_content(text).await {
                Ok(verdict) => {
                    if attempt > 1 {
                        tracing::info!(
                            provider = provider.name(),
                            attempt,
                            "Moderation succeeded after retry"
                        );
                    }
                    return Ok(verdict);
                }
                Err(ModerationError::RateLimited { retry_after }) => {
                    if attempt == max_attempts {
                        return Err(ModerationError::RateLimitExhausted {
                            provider: provider.name().to_string(),
                            attempts: max_attempts,
                        });
                    }

                    let wait = self.rate_limit_delay(retry_after);
                    tracing::warn!(
                        provider = provider.name(),
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited, waiting before retry"
                    );
                    sleep(wait).await;
                }
                Err(err) if !err.is_retryable() => {
                    tracing::error!(provider = provider.name(), error = %err, "Moderation failed permanently");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        provider = provider.name(),
                        attempt,
                        max_attempts,
                        error = %err,
                        "Moderation attempt failed"
                    );
                    last_error = Some(err);

                    if attempt < max_attempts {
                        sleep(self.backoff_for_attempt(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ModerationError::Transport("moderation gave up without an attempt".to_string())
        }))
    }
}
