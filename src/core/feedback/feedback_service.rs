// Feedback service - the operations callers (web handlers, CLIs) use.
//
// This service handles:
// - Submission, drafts and resubmission after rejection
// - Publishing, unpublishing and deleting by the recipient
// - External sharing of delivered feedback
// - Read queries for inbox, outbox and the public feed
//
// Moderation itself runs out-of-band: transitions into pending_review
// produce a ScheduleModeration effect, which this service hands to the queue.

use super::feedback_models::{
    ExternalCredential, FeedbackError, FeedbackFilter, FeedbackId, FeedbackItem, FeedbackOrder,
    FeedbackStatus, ModerationJob, UserId,
};
use super::feedback_ports::{ExternalPublisher, FeedbackStore, ModerationQueue};
use super::lifecycle::{self, Effect, Transition};
use chrono::Utc;
use std::sync::Arc;

pub struct FeedbackService<S: FeedbackStore> {
    store: Arc<S>,
    queue: Arc<dyn ModerationQueue>,
    publisher: Option<Arc<dyn ExternalPublisher>>,
}

impl<S: FeedbackStore> FeedbackService<S> {
    pub fn new(store: Arc<S>, queue: Arc<dyn ModerationQueue>) -> Self {
        Self {
            store,
            queue,
            publisher: None,
        }
    }

    /// Enable `share_externally` with the given publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn ExternalPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    // ------------------------------------------------------------------------
    // Sender operations
    // ------------------------------------------------------------------------

    /// Create feedback in `pending_review` and schedule moderation.
    pub async fn submit(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        text: &str,
    ) -> Result<FeedbackItem, FeedbackError> {
        let applied = lifecycle::submit(sender_id, recipient_id, text, Utc::now())?;
        self.store.insert(applied.item.clone()).await?;

        tracing::info!(
            feedback_id = %applied.item.id,
            sender_id = %sender_id,
            recipient_id = %recipient_id,
            "Feedback submitted"
        );

        self.run_effects(&applied.effects).await;
        Ok(applied.item)
    }

    /// Save feedback without submitting it. Drafts are not moderated.
    pub async fn create_draft(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        text: &str,
    ) -> Result<FeedbackItem, FeedbackError> {
        let item = lifecycle::draft(sender_id, recipient_id, text, Utc::now())?;
        self.store.insert(item.clone()).await?;
        tracing::debug!(feedback_id = %item.id, "Draft saved");
        Ok(item)
    }

    /// Submit a draft for moderation.
    pub async fn submit_draft(
        &self,
        feedback_id: FeedbackId,
        sender_id: UserId,
    ) -> Result<FeedbackItem, FeedbackError> {
        self.transition(feedback_id, Transition::SubmitDraft { sender_id })
            .await
    }

    /// Replace the text of rejected feedback and send it through moderation again.
    pub async fn resubmit(
        &self,
        feedback_id: FeedbackId,
        editor_id: UserId,
        new_text: &str,
    ) -> Result<FeedbackItem, FeedbackError> {
        let text = lifecycle::normalize_text(new_text)?;
        self.transition(feedback_id, Transition::Resubmit { editor_id, text })
            .await
    }

    // ------------------------------------------------------------------------
    // Recipient operations
    // ------------------------------------------------------------------------

    /// Publish (`desired = true`) or unpublish (`desired = false`) delivered feedback.
    pub async fn set_published(
        &self,
        feedback_id: FeedbackId,
        requester_id: UserId,
        desired: bool,
    ) -> Result<FeedbackItem, FeedbackError> {
        let transition = if desired {
            Transition::Publish { requester_id }
        } else {
            Transition::Unpublish { requester_id }
        };
        self.transition(feedback_id, transition).await
    }

    /// Remove delivered, unpublished feedback.
    pub async fn delete(
        &self,
        feedback_id: FeedbackId,
        requester_id: UserId,
    ) -> Result<(), FeedbackError> {
        self.store.delete(feedback_id, requester_id).await?;
        tracing::info!(feedback_id = %feedback_id, "Feedback deleted by recipient");
        Ok(())
    }

    /// Share delivered feedback on the recipient's connected social account.
    ///
    /// Text precedence: `custom_text`, then `modified_text`, then `original_text`.
    pub async fn share_externally(
        &self,
        feedback_id: FeedbackId,
        requester_id: UserId,
        credential: &ExternalCredential,
        custom_text: Option<&str>,
    ) -> Result<(), FeedbackError> {
        let publisher = self.publisher.as_ref().ok_or_else(|| {
            FeedbackError::ExternalPublish("no external publisher is configured".to_string())
        })?;

        let item = self.get(feedback_id).await?;
        if item.recipient_id != requester_id {
            return Err(FeedbackError::InvalidTransition(
                "Only the recipient can share this feedback".to_string(),
            ));
        }
        if !item.is_delivered() {
            return Err(FeedbackError::InvalidTransition(format!(
                "cannot share feedback {} while it is {}",
                item.id, item.status
            )));
        }

        let text = custom_text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| item.display_text());

        publisher
            .publish(credential, text)
            .await
            .map_err(|e| FeedbackError::ExternalPublish(e.to_string()))?;

        tracing::info!(feedback_id = %feedback_id, "Feedback shared externally");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get(&self, feedback_id: FeedbackId) -> Result<FeedbackItem, FeedbackError> {
        self.store
            .get(feedback_id)
            .await?
            .ok_or(FeedbackError::NotFound(feedback_id))
    }

    /// Feedback the user received and can see, newest first.
    pub async fn received(&self, recipient_id: UserId) -> Result<Vec<FeedbackItem>, FeedbackError> {
        self.store
            .list(&FeedbackFilter {
                recipient_id: Some(recipient_id),
                statuses: Some(vec![FeedbackStatus::Delivered, FeedbackStatus::Published]),
                ..Default::default()
            })
            .await
    }

    /// Everything the user sent, in any state, newest first.
    pub async fn sent(&self, sender_id: UserId) -> Result<Vec<FeedbackItem>, FeedbackError> {
        self.store
            .list(&FeedbackFilter {
                sender_id: Some(sender_id),
                ..Default::default()
            })
            .await
    }

    /// Public feed: published items, most recently published first.
    pub async fn public_feed(&self) -> Result<Vec<FeedbackItem>, FeedbackError> {
        self.store
            .list(&FeedbackFilter {
                statuses: Some(vec![FeedbackStatus::Published]),
                is_published: Some(true),
                order: FeedbackOrder::RecentlyPublishedFirst,
                ..Default::default()
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------------

    /// Re-enqueue every item still waiting for moderation.
    ///
    /// Run at startup so jobs lost in a crash get another chance. Duplicates
    /// are harmless: the orchestrator skips items that already left
    /// pending_review.
    pub async fn requeue_pending_reviews(&self) -> Result<usize, FeedbackError> {
        let pending = self
            .store
            .list(&FeedbackFilter {
                statuses: Some(vec![FeedbackStatus::PendingReview]),
                ..Default::default()
            })
            .await?;

        let mut requeued = 0;
        for item in pending {
            let job = ModerationJob {
                feedback_id: item.id,
                text: item.original_text.clone(),
            };
            match self.queue.enqueue(job).await {
                Ok(()) => requeued += 1,
                Err(e) => tracing::error!(feedback_id = %item.id, "Failed to requeue moderation: {}", e),
            }
        }

        Ok(requeued)
    }

    async fn transition(
        &self,
        feedback_id: FeedbackId,
        transition: Transition,
    ) -> Result<FeedbackItem, FeedbackError> {
        let applied = self
            .store
            .apply_transition(feedback_id, &transition, Utc::now())
            .await?;

        tracing::info!(
            feedback_id = %feedback_id,
            transition = transition.name(),
            status = %applied.item.status,
            "Feedback transition applied"
        );

        self.run_effects(&applied.effects).await;
        Ok(applied.item)
    }

    async fn run_effects(&self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::ScheduleModeration(job) => {
                    if let Err(e) = self.queue.enqueue(job.clone()).await {
                        // The item stays in pending_review and the startup sweep retries it.
                        tracing::error!(
                            feedback_id = %job.feedback_id,
                            "Failed to schedule moderation: {}",
                            e
                        );
                    }
                }
                other => tracing::debug!(?other, "Effect not handled by the feedback service"),
            }
        }
    }
}
