// Moderation provider port - the capability every backend implements.
//
// The orchestrator only ever talks to `dyn ModerationProvider`; which
// concrete classifier sits behind it is a configuration decision.

use super::moderation_models::ModerationVerdict;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum ModerationError {
    /// Unknown provider name or missing credential. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider asked us to slow down.
    #[error("Rate limited by moderation provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{provider} rate limit exceeded after {attempts} attempts")]
    RateLimitExhausted { provider: String, attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{provider} API error ({status}): {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Malformed moderation response: {0}")]
    MalformedResponse(String),

    /// Provider exists as an extension point only. Never retried.
    #[error("{0}")]
    NotImplemented(String),
}

impl ModerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ModerationError::Configuration(_) | ModerationError::NotImplemented(_)
        )
    }
}

// ============================================================================
// PROVIDER TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Classify a piece of feedback text.
    ///
    /// Any error means "verdict unavailable". Callers must not read an error
    /// as an implicit accept or reject.
    async fn moderate_content(&self, text: &str) -> Result<ModerationVerdict, ModerationError>;

    /// Human-readable provider name, used in pass annotations and logs.
    fn name(&self) -> &str;
}

/// Hands out the provider that is active for this process.
///
/// Resolution can fail (bad configuration), and the orchestrator treats that
/// failure like any other "verdict unavailable" condition.
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self) -> Result<Arc<dyn ModerationProvider>, ModerationError>;
}

/// Resolver that always returns the same, already constructed provider.
pub struct FixedProvider {
    provider: Arc<dyn ModerationProvider>,
}

impl FixedProvider {
    pub fn new(provider: Arc<dyn ModerationProvider>) -> Self {
        Self { provider }
    }
}

impl ProviderResolver for FixedProvider {
    fn resolve(&self) -> Result<Arc<dyn ModerationProvider>, ModerationError> {
        Ok(Arc::clone(&self.provider))
    }
}
