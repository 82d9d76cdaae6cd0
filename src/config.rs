// Process configuration, read from environment variables.
//
// `dotenv` is loaded by main before this runs, so a local `.env` file works
// the same as real environment variables.

use crate::core::moderation::{ModerationError, ProviderKind, RetryPolicy};
use crate::infra::moderation::ProviderSettings;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Moderation(#[from] ModerationError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub provider_settings: ProviderSettings,
    pub retry: RetryPolicy,
    pub database_url: String,
    pub notify_webhook_url: Option<String>,
    pub app_base_url: String,
    /// How often the worker looks for items still awaiting moderation
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let provider: ProviderKind = get("MODERATION_PROVIDER")
            .as_deref()
            .unwrap_or(ProviderKind::BinaryFlag.config_name())
            .parse()?;

        let threshold = parse_var::<f64>("MODERATION_THRESHOLD", get("MODERATION_THRESHOLD"))?;
        if let Some(threshold) = threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue {
                    var: "MODERATION_THRESHOLD",
                    value: threshold.to_string(),
                    reason: "must be between 0 and 1".to_string(),
                });
            }
        }

        let mut retry = RetryPolicy::for_provider(provider);
        if let Some(attempts) =
            parse_var::<u32>("MODERATION_MAX_RETRIES", get("MODERATION_MAX_RETRIES"))?
        {
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "MODERATION_MAX_RETRIES",
                    value: attempts.to_string(),
                    reason: "at least one attempt is required".to_string(),
                });
            }
            retry.max_attempts = attempts;
        }
        if let Some(ms) =
            parse_var::<u64>("MODERATION_BACKOFF_BASE_MS", get("MODERATION_BACKOFF_BASE_MS"))?
        {
            retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(
            "MODERATION_RATE_LIMIT_WAIT_MS",
            get("MODERATION_RATE_LIMIT_WAIT_MS"),
        )? {
            retry.rate_limit_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(
            "MODERATION_MAX_RATE_LIMIT_WAIT_MS",
            get("MODERATION_MAX_RATE_LIMIT_WAIT_MS"),
        )? {
            retry.max_rate_limit_wait = Duration::from_millis(ms);
        }

        let sweep_secs = parse_var::<u64>(
            "MODERATION_SWEEP_INTERVAL_SECS",
            get("MODERATION_SWEEP_INTERVAL_SECS"),
        )?
        .unwrap_or(30);
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MODERATION_SWEEP_INTERVAL_SECS",
                value: sweep_secs.to_string(),
                reason: "must be at least one second".to_string(),
            });
        }

        Ok(Self {
            provider,
            provider_settings: ProviderSettings {
                openai_api_key: get("OPENAI_API_KEY"),
                perspective_api_key: get("PERSPECTIVE_API_KEY"),
                threshold,
            },
            retry,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "data/feedback.db".to_string()),
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
            app_base_url: get("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

fn parse_var<T>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                var,
                value: value.clone(),
                reason: e.to_string(),
            })
    })
    .transpose()
}
