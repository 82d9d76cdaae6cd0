// OpenAI moderation endpoint client (binary-flag policy).
//
// The endpoint returns boolean flags per category. Only a curated harmful
// subset (hate, harassment, violence and their subtypes) leads to rejection.

use crate::core::moderation::{ModerationError, ModerationProvider, ModerationVerdict};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

const PROVIDER_NAME: &str = "OpenAI Moderation API";

/// Category groups that cause a rejection, with the label shown to the author.
const HARMFUL_GROUPS: [(&[&str], &str); 3] = [
    (
        &["hate", "hate/threatening"],
        "hate speech or discriminatory language",
    ),
    (
        &["harassment", "harassment/threatening"],
        "harassment or threatening content",
    ),
    (
        &["violence", "violence/graphic"],
        "violent or graphic content",
    ),
];

pub struct OpenAiModerationClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    results: Vec<ApiResult>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ApiResult {
    #[serde(default)]
    flagged: bool,
    #[serde(default)]
    categories: HashMap<String, bool>,
    #[serde(default)]
    category_scores: HashMap<String, f64>,
}

impl OpenAiModerationClient {
    /// Fails immediately when no API key is configured.
    pub fn new(api_key: Option<String>) -> Result<Self, ModerationError> {
        let api_key = api_key.filter(|key| !key.trim().is_empty()).ok_or_else(|| {
            ModerationError::Configuration(
                "OPENAI_API_KEY environment variable is required".to_string(),
            )
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ModerationError::Configuration(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ModerationError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Turn one moderation result into a verdict.
    fn evaluate(result: &ApiResult) -> ModerationVerdict {
        let is_set = |name: &str| result.categories.get(name).copied().unwrap_or(false);

        let categories: Vec<String> = HARMFUL_GROUPS
            .iter()
            .filter(|(names, _)| names.iter().any(|name| is_set(name)))
            .map(|(_, label)| label.to_string())
            .collect();

        let raw = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);

        if result.flagged && !categories.is_empty() {
            let reason = format!(
                "Your feedback was flagged for containing {}. Please revise your feedback to be \
                 constructive and respectful, avoiding any inappropriate language or harmful content.",
                categories.join(", ")
            );
            ModerationVerdict::reject(categories, reason, raw)
        } else {
            ModerationVerdict::accept(raw)
        }
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ModerationProvider for OpenAiModerationClient {
    async fn moderate_content(&self, text: &str) -> Result<ModerationVerdict, ModerationError> {
        let url = format!("{}/v1/moderations", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "input": text }))
            .send()
            .await
            .map_err(|e| ModerationError::Transport(e.to_string()))?;

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

        let data: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::MalformedResponse(e.to_string()))?;

        let result = data.results.first().ok_or_else(|| {
            ModerationError::MalformedResponse("response contained no results".to_string())
        })?;

        Ok(Self::evaluate(result))
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
