// LinkedIn posts API client for sharing feedback to the recipient's profile.
//
// Token refresh and the "account not connected" case are handled by whoever
// stores the credential; this client only posts.

use crate::core::feedback::{ExternalCredential, ExternalPublisher, PublishError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::info;

const API_VERSION: &str = "202504";

pub struct LinkedInPublisher {
    client: Client,
    base_url: String,
}

impl LinkedInPublisher {
    pub fn new() -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://api.linkedin.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `urn:li:person:{id}`, unless the id already is a URN.
    pub fn author_urn(member_id: &str) -> String {
        if member_id.starts_with("urn:") {
            member_id.to_string()
        } else {
            format!("urn:li:person:{}", member_id)
        }
    }

    fn share_body(member_id: &str, text: &str) -> serde_json::Value {
        json!({
            "author": Self::author_urn(member_id),
            "commentary": text,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": []
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false
        })
    }
}

#[async_trait]
impl ExternalPublisher for LinkedInPublisher {
    async fn publish(&self, credential: &ExternalCredential, text: &str) -> Result<(), PublishError> {
        let url = format!("{}/rest/posts", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .header("LinkedIn-Version", API_VERSION)
            .json(&Self::share_body(&credential.member_id, text))
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Shared feedback to LinkedIn");
        Ok(())
    }
}
