// Ports used by the feedback pipeline.
//
// Implementations live in infra/; tests provide their own.

use super::feedback_models::{
    ExternalCredential, FeedbackError, FeedbackFilter, FeedbackId, FeedbackItem, FeedbackNotice,
    ModerationJob, UserId, UserProfile,
};
use super::lifecycle::{Applied, Transition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Moderation queue is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("External publish transport error: {0}")]
    Transport(String),

    #[error("External publish failed ({status}): {body}")]
    Rejected { status: u16, body: String },
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Record-level persistence for feedback items.
///
/// `apply_transition` and `delete` must be atomic per record: the lifecycle
/// check and the write happen against the same version of the row, so a
/// stale or duplicate call cannot overwrite a newer state.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persist a newly created item.
    async fn insert(&self, item: FeedbackItem) -> Result<(), FeedbackError>;

    async fn get(&self, id: FeedbackId) -> Result<Option<FeedbackItem>, FeedbackError>;

    /// Validate `transition` against the stored item and persist the result.
    ///
    /// Returns `FeedbackError::NotFound` when the row is gone and
    /// `FeedbackError::InvalidTransition` when the current state forbids it.
    async fn apply_transition(
        &self,
        id: FeedbackId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Applied, FeedbackError>;

    /// Remove an item if `lifecycle::check_delete` allows it.
    async fn delete(&self, id: FeedbackId, requester_id: UserId) -> Result<(), FeedbackError>;

    async fn list(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackItem>, FeedbackError>;
}

/// Lookup of display data for internal user ids.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserProfile>, FeedbackError>;
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Out-of-band execution of moderation runs.
#[async_trait]
pub trait ModerationQueue: Send + Sync {
    async fn enqueue(&self, job: ModerationJob) -> Result<(), QueueError>;
}

/// Best-effort notifications. Failures are logged by the caller and never
/// undo the transition that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_delivered(&self, notice: &FeedbackNotice) -> Result<(), NotifyError>;

    async fn notify_rejected(&self, notice: &FeedbackNotice) -> Result<(), NotifyError>;
}

/// Sharing to an external social network.
#[async_trait]
pub trait ExternalPublisher: Send + Sync {
    async fn publish(&self, credential: &ExternalCredential, text: &str) -> Result<(), PublishError>;
}
