// Notification delivery over HTTP.
//
// Posts a JSON payload to `{webhook_base}/notify-feedback-delivered` or
// `{webhook_base}/notify-feedback-rejected`. The receiving endpoint renders
// and sends the actual email.

use crate::core::feedback::{FeedbackNotice, Notifier, NotifyError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveredPayload<'a> {
    feedback_id: String,
    recipient_email: &'a str,
    recipient_name: &'a str,
    sender_name: &'a str,
    feedback_text: &'a str,
    created_at: DateTime<Utc>,
    feedback_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectedPayload<'a> {
    feedback_id: String,
    sender_email: &'a str,
    sender_name: &'a str,
    recipient_name: &'a str,
    feedback_text: &'a str,
    ai_feedback: Option<&'a str>,
    created_at: DateTime<Utc>,
    edit_url: String,
}

pub struct WebhookNotifier {
    client: Client,
    webhook_base: String,
    app_base_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_base: &str, app_base_url: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            webhook_base: webhook_base.trim_end_matches('/').to_string(),
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn delivered_payload<'a>(&self, notice: &'a FeedbackNotice) -> DeliveredPayload<'a> {
        DeliveredPayload {
            feedback_id: notice.feedback_id.to_string(),
            recipient_email: &notice.recipient.email,
            recipient_name: &notice.recipient.display_name,
            sender_name: &notice.sender.display_name,
            feedback_text: &notice.text,
            created_at: notice.created_at,
            feedback_url: format!("{}/profile", self.app_base_url),
        }
    }

    fn rejected_payload<'a>(&self, notice: &'a FeedbackNotice) -> RejectedPayload<'a> {
        RejectedPayload {
            feedback_id: notice.feedback_id.to_string(),
            sender_email: &notice.sender.email,
            sender_name: &notice.sender.display_name,
            recipient_name: &notice.recipient.display_name,
            feedback_text: &notice.text,
            ai_feedback: notice.rejection_reason.as_deref(),
            created_at: notice.created_at,
            edit_url: format!("{}/search", self.app_base_url),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, payload: &T) -> Result<(), NotifyError> {
        let url = format!("{}/{}", self.webhook_base, path);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Notification accepted by {}", url);
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_delivered(&self, notice: &FeedbackNotice) -> Result<(), NotifyError> {
        self.post("notify-feedback-delivered", &self.delivered_payload(notice))
            .await?;
        info!(feedback_id = %notice.feedback_id, "Delivery notification sent");
        Ok(())
    }

    async fn notify_rejected(&self, notice: &FeedbackNotice) -> Result<(), NotifyError> {
        self.post("notify-feedback-rejected", &self.rejected_payload(notice))
            .await?;
        info!(feedback_id = %notice.feedback_id, "Rejection notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feedback::UserProfile;
    use uuid::Uuid;

    fn notice() -> FeedbackNotice {
        FeedbackNotice {
            feedback_id: Uuid::new_v4(),
            sender: UserProfile {
                id: Uuid::new_v4(),
                email: "erin@campus.edu".to_string(),
                display_name: "Erin".to_string(),
            },
            recipient: UserProfile {
                id: Uuid::new_v4(),
                email: "frank@campus.edu".to_string(),
                display_name: "Frank".to_string(),
            },
            text: "Thanks for mentoring me".to_string(),
            created_at: Utc::now(),
            rejection_reason: Some("Your feedback was flagged".to_string()),
        }
    }

    #[test]
    fn test_delivered_payload_fields() {
        let notifier = WebhookNotifier::new("http://hooks.local/", "https://app.example/").unwrap();
        let notice = notice();

        let json = serde_json::to_value(notifier.delivered_payload(&notice)).unwrap();

        assert_eq!(json["feedbackId"], notice.feedback_id.to_string());
        assert_eq!(json["recipientEmail"], "frank@campus.edu");
        assert_eq!(json["recipientName"], "Frank");
        assert_eq!(json["senderName"], "Erin");
        assert_eq!(json["feedbackText"], "Thanks for mentoring me");
        assert_eq!(json["feedbackUrl"], "https://app.example/profile");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_rejected_payload_goes_to_sender() {
        let notifier = WebhookNotifier::new("http://hooks.local", "http://localhost:3000").unwrap();
        let notice = notice();

        let json = serde_json::to_value(notifier.rejected_payload(&notice)).unwrap();

        assert_eq!(json["senderEmail"], "erin@campus.edu");
        assert_eq!(json["aiFeedback"], "Your feedback was flagged");
        assert_eq!(json["editUrl"], "http://localhost:3000/search");
        assert!(json.get("recipientEmail").is_none());
    }
}
