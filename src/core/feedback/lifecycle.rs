// Feedback lifecycle state machine.
//
// Every change to a FeedbackItem goes through this module. Stores call
// `Transition::apply` inside their single-record atomic update, so a
// transition is validated against the row as it is at write time
// (compare-and-set on the expected prior status).
//
//   (new) ----------------------------> pending_review
//   draft ------- sender submits -----> pending_review
//   pending_review -- verdict: reject -> rejected
//   pending_review -- verdict: accept -> approved -> delivered
//   pending_review -- no verdict -----> pending_approval
//   rejected ---- sender resubmits ---> pending_review
//   delivered --- recipient publishes > published
//   published --- recipient hides ----> delivered
//   delivered --- recipient deletes --> (removed)

use super::feedback_models::{
    FeedbackError, FeedbackId, FeedbackItem, FeedbackStatus, ModerationJob, UserId,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Annotation written when degraded mode kicks in.
pub const MODERATION_UNAVAILABLE_PREFIX: &str = "Automatic moderation unavailable";

/// Follow-up work a transition asks its caller to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The item entered `pending_review` and needs a moderation run.
    ScheduleModeration(ModerationJob),
    /// Tell the recipient that feedback arrived.
    NotifyDelivered(FeedbackId),
    /// Tell the sender that feedback was sent back.
    NotifyRejected(FeedbackId),
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The item as it must be persisted
    pub item: FeedbackItem,
    /// States the item passed through, in order (last is the resting state)
    pub path: Vec<FeedbackStatus>,
    pub effects: Vec<Effect>,
}

/// Operations that change an existing feedback item.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// draft -> pending_review
    SubmitDraft { sender_id: UserId },
    /// pending_review -> approved -> delivered
    Approve { provider_name: String },
    /// pending_review -> rejected
    Reject { reason: String },
    /// pending_review -> pending_approval
    MarkForManualReview { detail: String },
    /// rejected -> pending_review
    Resubmit { editor_id: UserId, text: String },
    /// delivered -> published
    Publish { requester_id: UserId },
    /// published -> delivered
    Unpublish { requester_id: UserId },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::SubmitDraft { .. } => "submit_draft",
            Transition::Approve { .. } => "approve",
            Transition::Reject { .. } => "reject",
            Transition::MarkForManualReview { .. } => "mark_for_manual_review",
            Transition::Resubmit { .. } => "resubmit",
            Transition::Publish { .. } => "publish",
            Transition::Unpublish { .. } => "unpublish",
        }
    }

    /// The statuses this transition may start from.
    pub fn allowed_from(&self) -> &'static [FeedbackStatus] {
        match self {
            Transition::SubmitDraft { .. } => &[FeedbackStatus::Draft],
            Transition::Approve { .. }
            | Transition::Reject { .. }
            | Transition::MarkForManualReview { .. } => &[FeedbackStatus::PendingReview],
            Transition::Resubmit { .. } => &[FeedbackStatus::Rejected],
            Transition::Publish { .. } => &[FeedbackStatus::Delivered],
            Transition::Unpublish { .. } => &[FeedbackStatus::Published],
        }
    }

    /// Validate the transition against `item` and compute the new item.
    ///
    /// `item` is left untouched; nothing happens unless the caller persists
    /// `Applied::item`.
    pub fn apply(&self, item: &FeedbackItem, now: DateTime<Utc>) -> Result<Applied, FeedbackError> {
        if !self.allowed_from().contains(&item.status) {
            return Err(FeedbackError::InvalidTransition(format!(
                "cannot {} feedback {} while it is {}",
                self.name(),
                item.id,
                item.status
            )));
        }

        let mut next = item.clone();
        let mut path = Vec::with_capacity(2);
        let mut effects = Vec::new();

        match self {
            Transition::SubmitDraft { sender_id } => {
                ensure_actor(*sender_id, item.sender_id, "Only the sender can submit this draft")?;
                next.status = FeedbackStatus::PendingReview;
                next.ai_feedback = None;
                path.push(FeedbackStatus::PendingReview);
                effects.push(schedule(&next));
            }
            Transition::Approve { provider_name } => {
                next.status = FeedbackStatus::Approved;
                next.ai_feedback = Some(format!("Passed moderation ({})", provider_name));
                path.push(FeedbackStatus::Approved);

                // Approval never rests; delivery is part of the same write.
                next.status = FeedbackStatus::Delivered;
                next.delivered_at.get_or_insert(now);
                path.push(FeedbackStatus::Delivered);
                effects.push(Effect::NotifyDelivered(item.id));
            }
            Transition::Reject { reason } => {
                next.status = FeedbackStatus::Rejected;
                next.ai_feedback = Some(reason.clone());
                path.push(FeedbackStatus::Rejected);
                effects.push(Effect::NotifyRejected(item.id));
            }
            Transition::MarkForManualReview { detail } => {
                next.status = FeedbackStatus::PendingApproval;
                next.ai_feedback = Some(format!("{}: {}", MODERATION_UNAVAILABLE_PREFIX, detail));
                path.push(FeedbackStatus::PendingApproval);
            }
            Transition::Resubmit { editor_id, text } => {
                ensure_actor(*editor_id, item.sender_id, "Only the sender can edit this feedback")?;
                next.original_text = normalize_text(text)?;
                next.modified_text = None;
                next.ai_feedback = None;
                next.status = FeedbackStatus::PendingReview;
                path.push(FeedbackStatus::PendingReview);
                effects.push(schedule(&next));
            }
            Transition::Publish { requester_id } => {
                ensure_actor(
                    *requester_id,
                    item.recipient_id,
                    "Only the recipient can publish this feedback",
                )?;
                next.status = FeedbackStatus::Published;
                next.is_published = true;
                next.published_at = Some(now);
                path.push(FeedbackStatus::Published);
            }
            Transition::Unpublish { requester_id } => {
                ensure_actor(
                    *requester_id,
                    item.recipient_id,
                    "Only the recipient can unpublish this feedback",
                )?;
                next.status = FeedbackStatus::Delivered;
                next.is_published = false;
                next.published_at = None;
                path.push(FeedbackStatus::Delivered);
            }
        }

        next.updated_at = now;
        debug_assert!(invariants_hold(&next));

        Ok(Applied {
            item: next,
            path,
            effects,
        })
    }
}

/// Create a new item straight into `pending_review`.
pub fn submit(
    sender_id: UserId,
    recipient_id: UserId,
    text: &str,
    now: DateTime<Utc>,
) -> Result<Applied, FeedbackError> {
    let item = new_item(sender_id, recipient_id, text, FeedbackStatus::PendingReview, now)?;
    let effects = vec![schedule(&item)];

    Ok(Applied {
        item,
        path: vec![FeedbackStatus::PendingReview],
        effects,
    })
}

/// Create a new item in `draft`. Drafts are not moderated.
pub fn draft(
    sender_id: UserId,
    recipient_id: UserId,
    text: &str,
    now: DateTime<Utc>,
) -> Result<FeedbackItem, FeedbackError> {
    new_item(sender_id, recipient_id, text, FeedbackStatus::Draft, now)
}

/// Check whether `requester_id` may delete `item` right now.
pub fn check_delete(item: &FeedbackItem, requester_id: UserId) -> Result<(), FeedbackError> {
    ensure_actor(requester_id, item.recipient_id, "Only the recipient can delete this feedback")?;

    if item.is_published {
        return Err(FeedbackError::InvalidTransition(format!(
            "feedback {} is published; unpublish it before deleting",
            item.id
        )));
    }
    if item.status != FeedbackStatus::Delivered {
        return Err(FeedbackError::InvalidTransition(format!(
            "cannot delete feedback {} while it is {}",
            item.id, item.status
        )));
    }
    Ok(())
}

/// Record-at-rest invariants.
pub fn invariants_hold(item: &FeedbackItem) -> bool {
    let published_implies_delivered = !item.is_published || item.is_delivered();
    let published_at_matches = item.is_published == item.published_at.is_some();
    let delivered_has_timestamp = !item.is_delivered() || item.delivered_at.is_some();
    let not_resting_in_approved = item.status != FeedbackStatus::Approved;

    published_implies_delivered
        && published_at_matches
        && delivered_has_timestamp
        && not_resting_in_approved
}

/// Trim and validate user-submitted text.
pub fn normalize_text(text: &str) -> Result<String, FeedbackError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FeedbackError::Validation(
            "Feedback text is required.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn new_item(
    sender_id: UserId,
    recipient_id: UserId,
    text: &str,
    status: FeedbackStatus,
    now: DateTime<Utc>,
) -> Result<FeedbackItem, FeedbackError> {
    if recipient_id.is_nil() {
        return Err(FeedbackError::Validation("Recipient is required.".to_string()));
    }
    if sender_id == recipient_id {
        return Err(FeedbackError::Validation(
            "You cannot send feedback to yourself.".to_string(),
        ));
    }

    Ok(FeedbackItem {
        id: Uuid::new_v4(),
        sender_id,
        recipient_id,
        original_text: normalize_text(text)?,
        modified_text: None,
        status,
        ai_feedback: None,
        is_published: false,
        created_at: now,
        updated_at: now,
        delivered_at: None,
        published_at: None,
    })
}

fn schedule(item: &FeedbackItem) -> Effect {
    Effect::ScheduleModeration(ModerationJob {
        feedback_id: item.id,
        text: item.original_text.clone(),
    })
}

fn ensure_actor(actor: UserId, owner: UserId, message: &str) -> Result<(), FeedbackError> {
    if actor != owner {
        return Err(FeedbackError::InvalidTransition(message.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(sender: UserId, recipient: UserId) -> FeedbackItem {
        submit(sender, recipient, "  You did a great job on the report  ", Utc::now())
            .unwrap()
            .item
    }

    fn approved(item: &FeedbackItem) -> FeedbackItem {
        Transition::Approve {
            provider_name: "Stub".to_string(),
        }
        .apply(item, Utc::now())
        .unwrap()
        .item
    }

    #[test]
    fn test_submit_trims_and_schedules() {
        let sender = Uuid::new_v4();
        let applied = submit(sender, Uuid::new_v4(), "  Thanks!  ", Utc::now()).unwrap();

        assert_eq!(applied.item.status, FeedbackStatus::PendingReview);
        assert_eq!(applied.item.original_text, "Thanks!");
        assert_eq!(
            applied.effects,
            vec![Effect::ScheduleModeration(ModerationJob {
                feedback_id: applied.item.id,
                text: "Thanks!".to_string(),
            })]
        );
    }

    #[test]
    fn test_submit_validation() {
        let sender = Uuid::new_v4();

        let empty = submit(sender, Uuid::new_v4(), "   ", Utc::now());
        assert!(matches!(empty, Err(FeedbackError::Validation(_))));

        let missing = submit(sender, Uuid::nil(), "Hi", Utc::now());
        assert!(matches!(missing, Err(FeedbackError::Validation(_))));

        let own = submit(sender, sender, "Hi", Utc::now());
        assert!(matches!(own, Err(FeedbackError::Validation(_))));
    }

    #[test]
    fn test_approve_goes_through_approved_to_delivered() {
        let item = pending(Uuid::new_v4(), Uuid::new_v4());
        let applied = Transition::Approve {
            provider_name: "OpenAI Moderation API".to_string(),
        }
        .apply(&item, Utc::now())
        .unwrap();

        assert_eq!(
            applied.path,
            vec![FeedbackStatus::Approved, FeedbackStatus::Delivered]
        );
        assert_eq!(applied.item.status, FeedbackStatus::Delivered);
        assert!(applied.item.delivered_at.is_some());
        assert_eq!(
            applied.item.ai_feedback.as_deref(),
            Some("Passed moderation (OpenAI Moderation API)")
        );
        assert_eq!(applied.effects, vec![Effect::NotifyDelivered(item.id)]);
    }

    #[test]
    fn test_verdict_transitions_require_pending_review() {
        let item = approved(&pending(Uuid::new_v4(), Uuid::new_v4()));

        let again = Transition::Reject {
            reason: "late verdict".to_string(),
        }
        .apply(&item, Utc::now());

        assert!(matches!(again, Err(FeedbackError::InvalidTransition(_))));
    }

    #[test]
    fn test_manual_review_keeps_error_detail() {
        let item = pending(Uuid::new_v4(), Uuid::new_v4());
        let applied = Transition::MarkForManualReview {
            detail: "OpenAI API error (500): boom".to_string(),
        }
        .apply(&item, Utc::now())
        .unwrap();

        assert_eq!(applied.item.status, FeedbackStatus::PendingApproval);
        let note = applied.item.ai_feedback.unwrap();
        assert!(note.starts_with(MODERATION_UNAVAILABLE_PREFIX));
        assert!(note.contains("boom"));
        assert!(applied.effects.is_empty());
    }

    #[test]
    fn test_resubmit_resets_moderation_fields() {
        let sender = Uuid::new_v4();
        let item = pending(sender, Uuid::new_v4());
        let rejected = Transition::Reject {
            reason: "harassment or threatening content".to_string(),
        }
        .apply(&item, Utc::now())
        .unwrap()
        .item;

        let applied = Transition::Resubmit {
            editor_id: sender,
            text: "Thanks for your help".to_string(),
        }
        .apply(&rejected, Utc::now())
        .unwrap();

        assert_eq!(applied.item.status, FeedbackStatus::PendingReview);
        assert_eq!(applied.item.original_text, "Thanks for your help");
        assert!(applied.item.ai_feedback.is_none());
        assert!(matches!(
            applied.effects.as_slice(),
            [Effect::ScheduleModeration(job)] if job.text == "Thanks for your help"
        ));
    }

    #[test]
    fn test_resubmit_rules() {
        let sender = Uuid::new_v4();
        let item = pending(sender, Uuid::new_v4());

        // Not rejected yet
        let early = Transition::Resubmit {
            editor_id: sender,
            text: "Edited".to_string(),
        }
        .apply(&item, Utc::now());
        assert!(matches!(early, Err(FeedbackError::InvalidTransition(_))));

        let rejected = Transition::Reject {
            reason: "no".to_string(),
        }
        .apply(&item, Utc::now())
        .unwrap()
        .item;

        // Someone else
        let stranger = Transition::Resubmit {
            editor_id: Uuid::new_v4(),
            text: "Edited".to_string(),
        }
        .apply(&rejected, Utc::now());
        assert!(matches!(stranger, Err(FeedbackError::InvalidTransition(_))));

        // Empty text
        let blank = Transition::Resubmit {
            editor_id: sender,
            text: "  ".to_string(),
        }
        .apply(&rejected, Utc::now());
        assert!(matches!(blank, Err(FeedbackError::Validation(_))));
    }

    #[test]
    fn test_publish_and_unpublish() {
        let recipient = Uuid::new_v4();
        let delivered = approved(&pending(Uuid::new_v4(), recipient));

        let published = Transition::Publish {
            requester_id: recipient,
        }
        .apply(&delivered, Utc::now())
        .unwrap()
        .item;
        assert_eq!(published.status, FeedbackStatus::Published);
        assert!(published.is_published);
        assert!(published.published_at.is_some());
        assert!(invariants_hold(&published));

        let hidden = Transition::Unpublish {
            requester_id: recipient,
        }
        .apply(&published, Utc::now())
        .unwrap()
        .item;
        assert_eq!(hidden.status, FeedbackStatus::Delivered);
        assert!(!hidden.is_published);
        assert!(hidden.published_at.is_none());
        assert_eq!(hidden.delivered_at, delivered.delivered_at);
    }

    #[test]
    fn test_only_recipient_publishes_delivered_items() {
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let item = pending(sender, recipient);

        let too_early = Transition::Publish {
            requester_id: recipient,
        }
        .apply(&item, Utc::now());
        assert!(matches!(too_early, Err(FeedbackError::InvalidTransition(_))));

        let delivered = approved(&item);
        let by_sender = Transition::Publish { requester_id: sender }.apply(&delivered, Utc::now());
        assert!(matches!(by_sender, Err(FeedbackError::InvalidTransition(_))));
    }

    #[test]
    fn test_delivered_at_is_never_overwritten() {
        let item = pending(Uuid::new_v4(), Uuid::new_v4());
        let mut replayed = item.clone();
        let first = Utc::now() - Duration::days(3);
        replayed.delivered_at = Some(first);

        let applied = Transition::Approve {
            provider_name: "Stub".to_string(),
        }
        .apply(&replayed, Utc::now())
        .unwrap();

        assert_eq!(applied.item.delivered_at, Some(first));
    }

    #[test]
    fn test_delete_rules() {
        let recipient = Uuid::new_v4();
        let delivered = approved(&pending(Uuid::new_v4(), recipient));

        assert!(check_delete(&delivered, recipient).is_ok());
        assert!(check_delete(&delivered, Uuid::new_v4()).is_err());

        let published = Transition::Publish {
            requester_id: recipient,
        }
        .apply(&delivered, Utc::now())
        .unwrap()
        .item;
        assert!(matches!(
            check_delete(&published, recipient),
            Err(FeedbackError::InvalidTransition(_))
        ));

        let in_review = pending(Uuid::new_v4(), recipient);
        assert!(check_delete(&in_review, recipient).is_err());
    }

    #[test]
    fn test_draft_submission() {
        let sender = Uuid::new_v4();
        let item = draft(sender, Uuid::new_v4(), "Draft text", Utc::now()).unwrap();
        assert_eq!(item.status, FeedbackStatus::Draft);

        let stranger = Transition::SubmitDraft {
            sender_id: Uuid::new_v4(),
        }
        .apply(&item, Utc::now());
        assert!(stranger.is_err());

        let applied = Transition::SubmitDraft { sender_id: sender }
            .apply(&item, Utc::now())
            .unwrap();
        assert_eq!(applied.item.status, FeedbackStatus::PendingReview);
        assert_eq!(applied.effects.len(), 1);
    }
}
