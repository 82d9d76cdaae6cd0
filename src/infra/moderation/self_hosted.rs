// Self-hosted moderation model. Reserved extension point: every call fails.

use crate::core::moderation::{ModerationError, ModerationProvider, ModerationVerdict};
use async_trait::async_trait;

pub struct SelfHostedModel;

#[async_trait]
impl ModerationProvider for SelfHostedModel {
    async fn moderate_content(&self, _text: &str) -> Result<ModerationVerdict, ModerationError> {
        Err(ModerationError::NotImplemented(
            "Self-hosted moderation model is not yet implemented".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "Self-hosted Model"
    }
}
