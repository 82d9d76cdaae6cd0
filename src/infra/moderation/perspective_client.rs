// Google Perspective API client (threshold policy).
//
// Perspective returns a summary score in [0, 1] per requested attribute.
// Any attribute at or above its threshold rejects the feedback.

use crate::core::moderation::{ModerationError, ModerationProvider, ModerationVerdict};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use super::openai_client::parse_retry_after;

const PROVIDER_NAME: &str = "Google Perspective API";

pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Attributes requested from the API.
const ATTRIBUTES: [&str; 6] = [
    "TOXICITY",
    "SEVERE_TOXICITY",
    "IDENTITY_ATTACK",
    "INSULT",
    "THREAT",
    "PROFANITY",
];

/// Specific attributes in severity order, with the label shown to the author.
/// Generic TOXICITY is handled separately.
const RANKED_LABELS: [(&str, &str); 5] = [
    ("SEVERE_TOXICITY", "toxic content"),
    ("THREAT", "threatening language"),
    ("IDENTITY_ATTACK", "discriminatory language"),
    ("INSULT", "insulting language"),
    ("PROFANITY", "profanity"),
];

const GENERIC_LABEL: &str = "inappropriate language";

pub struct PerspectiveClient {
    client: Client,
    api_key: String,
    base_url: String,
    thresholds: HashMap<&'static str, f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(default)]
    attribute_scores: HashMap<String, AttributeScore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeScore {
    summary_score: SummaryScore,
}

#[derive(Debug, Deserialize)]
struct SummaryScore {
    value: f64,
}

impl PerspectiveClient {
    /// Fails immediately when no API key is configured.
    pub fn new(api_key: Option<String>, threshold: f64) -> Result<Self, ModerationError> {
        let api_key = api_key.filter(|key| !key.trim().is_empty()).ok_or_else(|| {
            ModerationError::Configuration(
                "PERSPECTIVE_API_KEY environment variable is required".to_string(),
            )
        })?;

        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModerationError::Configuration(format!(
                "Moderation threshold must be between 0 and 1, got {}",
                threshold
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ModerationError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://commentanalyzer.googleapis.com".to_string(),
            thresholds: ATTRIBUTES.iter().map(|name| (*name, threshold)).collect(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn threshold_met(&self, scores: &HashMap<String, f64>, attribute: &str) -> bool {
        let threshold = self
            .thresholds
            .get(attribute)
            .copied()
            .unwrap_or(DEFAULT_THRESHOLD);
        scores
            .get(attribute)
            .map_or(false, |score| *score >= threshold)
    }

    fn evaluate(&self, scores: &HashMap<String, f64>) -> ModerationVerdict {
        let mut categories: Vec<String> = RANKED_LABELS
            .iter()
            .filter(|(attribute, _)| self.threshold_met(scores, attribute))
            .map(|(_, label)| label.to_string())
            .collect();

        let toxic = self.threshold_met(scores, "TOXICITY");
        if toxic && categories.is_empty() {
            categories.push(GENERIC_LABEL.to_string());
        }

        let raw = json!({ "scores": scores, "thresholds": self.thresholds });

        if categories.is_empty() {
            return ModerationVerdict::accept(raw);
        }

        let reason = format!(
            "Your feedback was flagged for containing {}. In a professional feedback setting, \
             please focus on specific behaviors or outcomes rather than personal attributes. \
             Constructive criticism is welcome, but it should remain respectful.",
            categories.join(", ")
        );
        ModerationVerdict::reject(categories, reason, raw)
    }
}

#[async_trait]
impl ModerationProvider for PerspectiveClient {
    async fn moderate_content(&self, text: &str) -> Result<ModerationVerdict, ModerationError> {
        let url = format!(
            "{}/v1alpha1/comments:analyze?key={}",
            self.base_url, self.api_key
        );

        let requested: HashMap<&str, serde_json::Value> =
            ATTRIBUTES.iter().map(|name| (*name, json!({}))).collect();
        let payload = json!({
            "comment": { "text": text },
            "context": {
                "entries": [{
                    "text": "This is professional feedback in a university/workplace setting"
                }]
            },
            "languages": ["en", "de"],
            "requestedAttributes": requested,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            // reqwest includes the URL in its errors, and the URL carries the key
            .map_err(|e| ModerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModerationError::RateLimited {
                retry_after: parse_retry_after(response.headers().get(RETRY_AFTER)),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModerationError::Upstream {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let data: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::MalformedResponse(e.without_url().to_string()))?;

        let scores: HashMap<String, f64> = data
            .attribute_scores
            .into_iter()
            .map(|(name, score)| (name, score.summary_score.value))
            .collect();

        Ok(self.evaluate(&scores))
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
