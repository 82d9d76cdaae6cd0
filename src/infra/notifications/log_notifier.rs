// Notifier that only writes to the log. Used when no webhook is configured.

use crate::core::feedback::{FeedbackNotice, Notifier, NotifyError};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_delivered(&self, notice: &FeedbackNotice) -> Result<(), NotifyError> {
        info!(
            feedback_id = %notice.feedback_id,
            recipient = %notice.recipient.email,
            sender = %notice.sender.display_name,
            "Feedback delivered"
        );
        Ok(())
    }

    async fn notify_rejected(&self, notice: &FeedbackNotice) -> Result<(), NotifyError> {
        info!(
            feedback_id = %notice.feedback_id,
            sender = %notice.sender.email,
            reason = notice.rejection_reason.as_deref().unwrap_or("none given"),
            "Feedback rejected"
        );
        Ok(())
    }
}
