// Moderation domain models - verdicts and provider selection.
//
// These are pure domain types with no HTTP dependencies.
// The infra layer converts provider-specific responses into these.

use super::moderation_provider::ModerationError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Result of a single moderation call.
///
/// Verdicts are never stored on their own. Only their digest (`status` and
/// `ai_feedback`) ends up on the feedback item.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationVerdict {
    /// Whether the text must be sent back to its author
    pub should_reject: bool,
    /// Human-readable explanation, present when `should_reject` is true
    pub rejection_reason: Option<String>,
    /// Labels of the categories that were flagged, in reporting order
    pub categories: Vec<String>,
    /// Provider-specific detail, kept for audit logging only
    pub raw: serde_json::Value,
}

impl ModerationVerdict {
    /// Create an "acceptable content" verdict.
    pub fn accept(raw: serde_json::Value) -> Self {
        Self {
            should_reject: false,
            rejection_reason: None,
            categories: Vec::new(),
            raw,
        }
    }

    /// Create a rejection verdict.
    pub fn reject(categories: Vec<String>, reason: String, raw: serde_json::Value) -> Self {
        Self {
            should_reject: true,
            rejection_reason: Some(reason),
            categories,
            raw,
        }
    }

    /// The reason to show the author. Falls back to the category list when a
    /// provider rejected without wording one.
    pub fn reason_or_default(&self) -> String {
        match &self.rejection_reason {
            Some(reason) if !reason.trim().is_empty() => reason.clone(),
            _ if !self.categories.is_empty() => format!(
                "Your feedback was flagged for containing {}.",
                self.categories.join(", ")
            ),
            _ => "Your feedback was flagged by automatic moderation.".to_string(),
        }
    }
}

/// The moderation backends this system knows how to build.
///
/// A closed set: unknown names are rejected when the configuration is read,
/// never looked up lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Remote classifier returning boolean category flags (OpenAI-style)
    BinaryFlag,
    /// Remote classifier returning per-category scores (Perspective-style)
    Threshold,
    /// In-process model. Reserved, not implemented.
    SelfHosted,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::BinaryFlag,
        ProviderKind::Threshold,
        ProviderKind::SelfHosted,
    ];

    /// Canonical configuration name.
    pub fn config_name(&self) -> &'static str {
        match self {
            ProviderKind::BinaryFlag => "openai-style-binary",
            ProviderKind::Threshold => "threshold-based",
            ProviderKind::SelfHosted => "self-hosted-placeholder",
        }
    }

    /// Older names still accepted in configuration.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::BinaryFlag => &["openai"],
            ProviderKind::Threshold => &["perspective"],
            ProviderKind::SelfHosted => &["tensorflow"],
        }
    }

    /// Base delay for `attempt * base` backoff between transient failures.
    pub fn default_backoff_base(&self) -> Duration {
        match self {
            ProviderKind::BinaryFlag => Duration::from_millis(2000),
            ProviderKind::Threshold | ProviderKind::SelfHosted => Duration::from_millis(1000),
        }
    }

    /// Wait applied on a rate-limit response that carries no retry-after hint.
    pub fn default_rate_limit_wait(&self) -> Duration {
        match self {
            ProviderKind::BinaryFlag => Duration::from_secs(5),
            ProviderKind::Threshold | ProviderKind::SelfHosted => Duration::from_secs(2),
        }
    }

    /// Comma separated canonical names, for error messages.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.config_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config_name())
    }
}

impl FromStr for ProviderKind {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.config_name() == wanted || kind.aliases().contains(&wanted.as_str()))
            .ok_or_else(|| {
                ModerationError::Configuration(format!(
                    "Unknown moderation provider: {}. Available: {}",
                    s,
                    Self::valid_names()
                ))
            })
    }
}
