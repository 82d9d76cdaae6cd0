// Provider factory - builds moderation providers by configuration name.
//
// Credentials are checked at construction, so a missing key surfaces when the
// provider is built (at startup) rather than on the first moderation call.

use super::openai_client::OpenAiModerationClient;
use super::perspective_client::{PerspectiveClient, DEFAULT_THRESHOLD};
use super::self_hosted::SelfHostedModel;
use crate::core::moderation::{ModerationError, ModerationProvider, ProviderKind, ProviderResolver};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Credentials and tuning needed to build any provider.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub perspective_api_key: Option<String>,
    /// Uniform threshold for the threshold provider; `None` uses the default.
    pub threshold: Option<f64>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("openai_api_key", &self.openai_api_key.as_deref().map(mask_key))
            .field(
                "perspective_api_key",
                &self.perspective_api_key.as_deref().map(mask_key),
            )
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Show only the first and last four characters of a credential.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

pub struct ProviderFactory {
    settings: ProviderSettings,
    configured: String,
    cached: OnceLock<Arc<dyn ModerationProvider>>,
}

impl ProviderFactory {
    /// `configured` is the provider name the resolver hands out.
    pub fn new(settings: ProviderSettings, configured: impl Into<String>) -> Self {
        Self {
            settings,
            configured: configured.into(),
            cached: OnceLock::new(),
        }
    }

    /// Build a fresh provider for a configuration name (or alias).
    pub fn get_provider(&self, name: &str) -> Result<Arc<dyn ModerationProvider>, ModerationError> {
        let kind: ProviderKind = name.parse()?;
        self.build(kind)
    }

    pub fn build(&self, kind: ProviderKind) -> Result<Arc<dyn ModerationProvider>, ModerationError> {
        let provider: Arc<dyn ModerationProvider> = match kind {
            ProviderKind::BinaryFlag => Arc::new(OpenAiModerationClient::new(
                self.settings.openai_api_key.clone(),
            )?),
            ProviderKind::Threshold => Arc::new(PerspectiveClient::new(
                self.settings.perspective_api_key.clone(),
                self.settings.threshold.unwrap_or(DEFAULT_THRESHOLD),
            )?),
            ProviderKind::SelfHosted => Arc::new(SelfHostedModel),
        };

        info!("Built moderation provider {} ({})", provider.name(), kind);
        Ok(provider)
    }
}

impl ProviderResolver for ProviderFactory {
    /// Builds the configured provider once and reuses it afterwards.
    /// A failed build is not cached, so the next call tries again.
    fn resolve(&self) -> Result<Arc<dyn ModerationProvider>, ModerationError> {
        if let Some(provider) = self.cached.get() {
            return Ok(Arc::clone(provider));
        }
        let provider = self.get_provider(&self.configured)?;
        Ok(Arc::clone(self.cached.get_or_init(|| provider)))
    }
}
