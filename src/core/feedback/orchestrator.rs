// Moderation orchestrator - runs one moderation job to a recorded outcome.
//
// Steps:
// 1. Check the item is still waiting for this exact text (stale jobs are no-ops)
// 2. Resolve the active provider
// 3. Call it under the retry policy
// 4. Apply reject / approve+deliver, or fall back to pending_approval
// 5. Fire best-effort notifications
//
// Provider and network errors never escape: they become the
// pending_approval state with the error text in ai_feedback.

use super::feedback_models::{
    FeedbackError, FeedbackId, FeedbackItem, FeedbackNotice, FeedbackStatus, UserId, UserProfile,
};
use super::feedback_ports::{FeedbackStore, Notifier, UserDirectory};
use super::lifecycle::{Applied, Effect, Transition};
use crate::core::moderation::{ProviderResolver, RetryPolicy};
use chrono::Utc;
use std::sync::Arc;

pub struct ModerationOrchestrator<S: FeedbackStore> {
    store: Arc<S>,
    resolver: Arc<dyn ProviderResolver>,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn UserDirectory>,
}

impl<S: FeedbackStore> ModerationOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<dyn ProviderResolver>,
        retry: RetryPolicy,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            resolver,
            retry,
            notifier,
            directory,
        }
    }

    /// Moderate one feedback item. The outcome is only observable through the
    /// item's persisted state.
    pub async fn moderate(&self, feedback_id: FeedbackId, text: &str) {
        match self.store.get(feedback_id).await {
            Ok(Some(item)) if item.status != FeedbackStatus::PendingReview => {
                tracing::info!(
                    feedback_id = %feedback_id,
                    status = %item.status,
                    "Skipping moderation, item already left pending_review"
                );
                return;
            }
            Ok(Some(item)) if item.original_text != text => {
                tracing::info!(
                    feedback_id = %feedback_id,
                    "Skipping moderation, text changed since the job was scheduled"
                );
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(feedback_id = %feedback_id, "Skipping moderation, feedback no longer exists");
                return;
            }
            Err(e) => {
                // Carry on: the write below is guarded and records an outcome either way.
                tracing::warn!(feedback_id = %feedback_id, "Could not load feedback before moderation: {}", e);
            }
        }

        let transition = self.decide(feedback_id, text).await;
        self.record(feedback_id, transition).await;
    }

    /// Ask the provider and turn its answer (or failure) into a transition.
    async fn decide(&self, feedback_id: FeedbackId, text: &str) -> Transition {
        let provider = match self.resolver.resolve() {
            Ok(provider) => provider,
            Err(e) => {
                tracing::error!(feedback_id = %feedback_id, "No moderation provider available: {}", e);
                return Transition::MarkForManualReview {
                    detail: e.to_string(),
                };
            }
        };

        tracing::info!(
            feedback_id = %feedback_id,
            provider = provider.name(),
            "Processing moderation"
        );

        match self.retry.run(provider.as_ref(), text).await {
            Ok(verdict) if verdict.should_reject => {
                tracing::info!(
                    feedback_id = %feedback_id,
                    provider = provider.name(),
                    categories = ?verdict.categories,
                    raw = %verdict.raw,
                    "Feedback rejected by moderation"
                );
                Transition::Reject {
                    reason: verdict.reason_or_default(),
                }
            }
            Ok(verdict) => {
                tracing::debug!(feedback_id = %feedback_id, raw = %verdict.raw, "Feedback passed moderation");
                Transition::Approve {
                    provider_name: provider.name().to_string(),
                }
            }
            Err(e) => {
                tracing::error!(
                    feedback_id = %feedback_id,
                    provider = provider.name(),
                    "Moderation unavailable, marking for manual review: {}",
                    e
                );
                Transition::MarkForManualReview {
                    detail: e.to_string(),
                }
            }
        }
    }

    /// Persist the outcome. Falls back to pending_approval if the verdict
    /// itself cannot be written, so the item never sits in pending_review
    /// without a trace.
    async fn record(&self, feedback_id: FeedbackId, transition: Transition) {
        match self.store.apply_transition(feedback_id, &transition, Utc::now()).await {
            Ok(applied) => {
                tracing::info!(
                    feedback_id = %feedback_id,
                    path = ?applied.path,
                    "Moderation outcome recorded"
                );
                self.run_effects(&applied).await;
            }
            Err(FeedbackError::NotFound(_)) => {
                tracing::warn!(feedback_id = %feedback_id, "Feedback deleted during moderation, outcome dropped");
            }
            Err(FeedbackError::InvalidTransition(reason)) => {
                tracing::info!(feedback_id = %feedback_id, "Stale moderation outcome ignored: {}", reason);
            }
            Err(e) => {
                tracing::error!(feedback_id = %feedback_id, "Failed to record moderation outcome: {}", e);
                if matches!(transition, Transition::MarkForManualReview { .. }) {
                    return;
                }

                let fallback = Transition::MarkForManualReview {
                    detail: format!("could not record moderation result: {}", e),
                };
                if let Err(fallback_err) = self
                    .store
                    .apply_transition(feedback_id, &fallback, Utc::now())
                    .await
                {
                    tracing::error!(
                        feedback_id = %feedback_id,
                        "Fallback update failed: {}",
                        fallback_err
                    );
                }
            }
        }
    }

    async fn run_effects(&self, applied: &Applied) {
        for effect in &applied.effects {
            let result = match effect {
                Effect::NotifyDelivered(_) => match self.notice_for(&applied.item, None).await {
                    Some(notice) => self.notifier.notify_delivered(&notice).await,
                    None => continue,
                },
                Effect::NotifyRejected(_) => {
                    let reason = applied.item.ai_feedback.clone();
                    match self.notice_for(&applied.item, reason).await {
                        Some(notice) => self.notifier.notify_rejected(&notice).await,
                        None => continue,
                    }
                }
                other => {
                    tracing::debug!(?other, "Effect not handled by the orchestrator");
                    continue;
                }
            };

            if let Err(e) = result {
                tracing::warn!(feedback_id = %applied.item.id, "Notification failed: {}", e);
            }
        }
    }

    async fn notice_for(
        &self,
        item: &FeedbackItem,
        rejection_reason: Option<String>,
    ) -> Option<FeedbackNotice> {
        let sender = self.lookup_user(item, item.sender_id).await?;
        let recipient = self.lookup_user(item, item.recipient_id).await?;

        Some(FeedbackNotice {
            feedback_id: item.id,
            sender,
            recipient,
            text: item.display_text().to_string(),
            created_at: item.created_at,
            rejection_reason,
        })
    }

    async fn lookup_user(
        &self,
        item: &FeedbackItem,
        user_id: UserId,
    ) -> Option<UserProfile> {
        match self.directory.find_user(user_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::warn!(feedback_id = %item.id, user_id = %user_id, "Skipping notification, unknown user");
                None
            }
            Err(e) => {
                tracing::warn!(feedback_id = %item.id, "Skipping notification, user lookup failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feedback::{lifecycle, FeedbackService, FeedbackStatus};
    use crate::core::moderation::{FixedProvider, ModerationError, ModerationVerdict};
    use crate::infra::feedback::{InMemoryFeedbackStore, InMemoryUserDirectory};
    use crate::test_support::{
        failing_resolver, FlakyStore, RecordingNotifier, RecordingQueue, ScriptedProvider,
    };
    use uuid::Uuid;

    struct Fixture {
        store: Arc<InMemoryFeedbackStore>,
        notifier: Arc<RecordingNotifier>,
        directory: Arc<InMemoryUserDirectory>,
        sender: Uuid,
        recipient: Uuid,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(InMemoryUserDirectory::new());
        let sender = directory.add_user("alice@campus.edu", "Alice").id;
        let recipient = directory.add_user("bob@campus.edu", "Bob").id;
        Fixture {
            store: Arc::new(InMemoryFeedbackStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            directory,
            sender,
            recipient,
        }
    }

    fn orchestrator(
        fx: &Fixture,
        provider: Arc<ScriptedProvider>,
    ) -> ModerationOrchestrator<InMemoryFeedbackStore> {
        ModerationOrchestrator::new(
            Arc::clone(&fx.store),
            Arc::new(FixedProvider::new(provider)),
            RetryPolicy::immediate(3),
            fx.notifier.clone(),
            fx.directory.clone(),
        )
    }

    async fn submit(fx: &Fixture, text: &str) -> FeedbackItem {
        let applied = lifecycle::submit(fx.sender, fx.recipient, text, Utc::now()).unwrap();
        fx.store.insert(applied.item.clone()).await.unwrap();
        applied.item
    }

    #[tokio::test]
    async fn test_accepted_feedback_is_delivered() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::accepting().named("Stub Moderation"));
        let item = submit(&fx, "You did a great job on the report").await;

        orchestrator(&fx, provider).moderate(item.id, &item.original_text).await;

        let stored = fx.store.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FeedbackStatus::Delivered);
        assert!(stored.delivered_at.is_some());
        assert!(stored.ai_feedback.unwrap().contains("Stub Moderation"));
        assert_eq!(fx.notifier.delivered(), vec![item.id]);
    }

    #[tokio::test]
    async fn test_flagged_feedback_is_rejected() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::rejecting("harassment"));
        let item = submit(&fx, "You are useless").await;

        orchestrator(&fx, provider).moderate(item.id, &item.original_text).await;

        let stored = fx.store.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FeedbackStatus::Rejected);
        assert!(stored.ai_feedback.unwrap().contains("harassment"));
        assert!(stored.delivered_at.is_none());
        assert_eq!(fx.notifier.rejected(), vec![item.id]);
        assert!(fx.notifier.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_falls_back_to_manual_review() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::failing(ModerationError::Transport(
            "connection refused".to_string(),
        )));
        let item = submit(&fx, "Solid teamwork this sprint").await;

        orchestrator(&fx, provider.clone())
            .moderate(item.id, &item.original_text)
            .await;

        assert_eq!(provider.calls(), 3);
        let stored = fx.store.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FeedbackStatus::PendingApproval);
        let note = stored.ai_feedback.unwrap();
        assert!(!note.is_empty());
        assert!(note.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_unresolvable_provider_falls_back_to_manual_review() {
        let fx = fixture();
        let item = submit(&fx, "Solid teamwork this sprint").await;
        let orchestrator = ModerationOrchestrator::new(
            Arc::clone(&fx.store),
            failing_resolver("OPENAI_API_KEY environment variable is required"),
            RetryPolicy::immediate(3),
            fx.notifier.clone(),
            fx.directory.clone(),
        );

        orchestrator.moderate(item.id, &item.original_text).await;

        let stored = fx.store.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FeedbackStatus::PendingApproval);
        assert!(stored.ai_feedback.unwrap().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_same_text_same_verdict() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::keyword_filter("idiot"));
        let orchestrator = orchestrator(&fx, provider);

        let first = submit(&fx, "Don't be an idiot").await;
        let second = submit(&fx, "Don't be an idiot").await;
        orchestrator.moderate(first.id, &first.original_text).await;
        orchestrator.moderate(second.id, &second.original_text).await;

        let first = fx.store.get(first.id).await.unwrap().unwrap();
        let second = fx.store.get(second.id).await.unwrap().unwrap();
        assert_eq!(first.status, FeedbackStatus::Rejected);
        assert_eq!(first.status, second.status);
    }

    #[tokio::test]
    async fn test_resubmission_cycle_reaches_delivery() {
        let fx = fixture();
        let provider = Arc::new(
            ScriptedProvider::new(vec![Ok(ModerationVerdict::reject(
                vec!["harassment or threatening content".to_string()],
                "Your feedback was flagged for containing harassment or threatening content."
                    .to_string(),
                serde_json::Value::Null,
            ))])
            .then_always(Ok(ModerationVerdict::accept(serde_json::Value::Null))),
        );
        let orchestrator = orchestrator(&fx, provider);
        let queue = Arc::new(RecordingQueue::new());
        let service = FeedbackService::new(Arc::clone(&fx.store), queue.clone());

        let item = service
            .submit(fx.sender, fx.recipient, "Your report was garbage")
            .await
            .unwrap();
        orchestrator.moderate(item.id, &item.original_text).await;
        let rejected = service.get(item.id).await.unwrap();
        assert_eq!(rejected.status, FeedbackStatus::Rejected);
        assert!(rejected.delivered_at.is_none());

        let resubmitted = service
            .resubmit(item.id, fx.sender, "Thanks for your help")
            .await
            .unwrap();
        assert_eq!(resubmitted.status, FeedbackStatus::PendingReview);
        assert!(resubmitted.ai_feedback.is_none());

        let job = queue.jobs().pop().unwrap();
        orchestrator.moderate(job.feedback_id, &job.text).await;

        let delivered = service.get(item.id).await.unwrap();
        assert_eq!(delivered.status, FeedbackStatus::Delivered);
        assert_eq!(delivered.original_text, "Thanks for your help");
        assert!(delivered.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_job_is_a_no_op() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::accepting());
        let item = submit(&fx, "Great talk").await;
        let orchestrator = orchestrator(&fx, provider.clone());

        orchestrator.moderate(item.id, &item.original_text).await;
        let delivered = fx.store.get(item.id).await.unwrap().unwrap();

        // Duplicate delivery of the same job
        orchestrator.moderate(item.id, &item.original_text).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(fx.store.get(item.id).await.unwrap().unwrap(), delivered);
        assert_eq!(fx.notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_job_for_outdated_text_is_skipped() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::accepting());
        let item = submit(&fx, "Current text").await;

        orchestrator(&fx, provider.clone())
            .moderate(item.id, "Text from an earlier submission")
            .await;

        assert_eq!(provider.calls(), 0);
        assert_eq!(
            fx.store.get(item.id).await.unwrap().unwrap().status,
            FeedbackStatus::PendingReview
        );
    }

    #[tokio::test]
    async fn test_deleted_item_is_not_an_error() {
        let fx = fixture();
        let provider = Arc::new(ScriptedProvider::accepting());

        orchestrator(&fx, provider.clone())
            .moderate(Uuid::new_v4(), "Nobody home")
            .await;

        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_delivery() {
        let fx = fixture();
        fx.notifier.fail_all();
        let provider = Arc::new(ScriptedProvider::accepting());
        let item = submit(&fx, "Great talk").await;

        orchestrator(&fx, provider).moderate(item.id, &item.original_text).await;

        assert_eq!(
            fx.store.get(item.id).await.unwrap().unwrap().status,
            FeedbackStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_failed_verdict_write_falls_back_to_manual_review() {
        let fx = fixture();
        let flaky = Arc::new(FlakyStore::new(InMemoryFeedbackStore::new(), 1));
        let applied = lifecycle::submit(fx.sender, fx.recipient, "Great talk", Utc::now()).unwrap();
        flaky.insert(applied.item.clone()).await.unwrap();
        let orchestrator = ModerationOrchestrator::new(
            Arc::clone(&flaky),
            Arc::new(FixedProvider::new(Arc::new(ScriptedProvider::accepting()))),
            RetryPolicy::immediate(3),
            fx.notifier.clone(),
            fx.directory.clone(),
        );

        orchestrator
            .moderate(applied.item.id, &applied.item.original_text)
            .await;

        let stored = flaky.get(applied.item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FeedbackStatus::PendingApproval);
        assert!(stored
            .ai_feedback
            .unwrap()
            .contains("could not record moderation result"));
    }
}
