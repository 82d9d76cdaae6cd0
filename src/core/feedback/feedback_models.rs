// Feedback domain models.
//
// These are pure domain types with no storage or HTTP dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type FeedbackId = Uuid;
pub type UserId = Uuid;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum FeedbackError {
    /// Bad input, rejected before anything is persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not allowed for the item's current state or for this user.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Feedback {0} not found")]
    NotFound(FeedbackId),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("External publish failed: {0}")]
    ExternalPublish(String),
}

// ============================================================================
// STATUS
// ============================================================================

/// Lifecycle state of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// Saved by the sender but not submitted yet
    Draft,
    /// Waiting for automatic moderation
    PendingReview,
    /// Passed moderation. Never persisted at rest, delivery follows at once.
    Approved,
    /// Visible to the recipient
    Delivered,
    /// Visible in the public feed
    Published,
    /// Sent back to the sender with a reason
    Rejected,
    /// Moderation could not produce a verdict; needs a human
    PendingApproval,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Draft => "draft",
            FeedbackStatus::PendingReview => "pending_review",
            FeedbackStatus::Approved => "approved",
            FeedbackStatus::Delivered => "delivered",
            FeedbackStatus::Published => "published",
            FeedbackStatus::Rejected => "rejected",
            FeedbackStatus::PendingApproval => "pending_approval",
        }
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedbackStatus {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(FeedbackStatus::Draft),
            "pending_review" => Ok(FeedbackStatus::PendingReview),
            "approved" => Ok(FeedbackStatus::Approved),
            "delivered" => Ok(FeedbackStatus::Delivered),
            "published" => Ok(FeedbackStatus::Published),
            "rejected" => Ok(FeedbackStatus::Rejected),
            "pending_approval" => Ok(FeedbackStatus::PendingApproval),
            other => Err(FeedbackError::StorageError(format!(
                "Unknown feedback status '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// FEEDBACK ITEM
// ============================================================================

/// A piece of feedback from one user to another.
///
/// Fields are only changed through `lifecycle::Transition`; the rest of the
/// crate treats this as a read model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub id: FeedbackId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    /// Text as last submitted by the sender
    pub original_text: String,
    /// Replacement text for display, takes precedence when present
    pub modified_text: Option<String>,
    pub status: FeedbackStatus,
    /// Rejection reason, pass annotation or degraded-mode explanation
    pub ai_feedback: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedbackItem {
    /// Text to show or share: `modified_text` wins over `original_text`.
    pub fn display_text(&self) -> &str {
        self.modified_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(&self.original_text)
    }

    /// Whether the recipient can currently see this item.
    pub fn is_delivered(&self) -> bool {
        matches!(
            self.status,
            FeedbackStatus::Delivered | FeedbackStatus::Published
        )
    }
}

/// Identity data for a signed-in user, as handed over by the identity provider
/// after the caller mapped it to an internal id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
}

// ============================================================================
// QUERIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackOrder {
    /// `created_at` descending
    #[default]
    NewestFirst,
    /// `published_at` descending (unpublished last), then `created_at` descending
    RecentlyPublishedFirst,
}

/// Field filters for listing feedback. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackFilter {
    pub recipient_id: Option<UserId>,
    pub sender_id: Option<UserId>,
    pub statuses: Option<Vec<FeedbackStatus>>,
    pub is_published: Option<bool>,
    pub order: FeedbackOrder,
}

impl FeedbackFilter {
    pub fn matches(&self, item: &FeedbackItem) -> bool {
        self.recipient_id.map_or(true, |id| item.recipient_id == id)
            && self.sender_id.map_or(true, |id| item.sender_id == id)
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&item.status))
            && self
                .is_published
                .map_or(true, |flag| item.is_published == flag)
    }

    /// Sort a result set according to `order`.
    pub fn sort(&self, items: &mut [FeedbackItem]) {
        match self.order {
            FeedbackOrder::NewestFirst => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            // Option orders None before Some, so descending puts unpublished last.
            FeedbackOrder::RecentlyPublishedFirst => items.sort_by(|a, b| {
                b.published_at
                    .cmp(&a.published_at)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }
    }
}

// ============================================================================
// JOBS AND NOTICES
// ============================================================================

/// A request to moderate one feedback item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationJob {
    pub feedback_id: FeedbackId,
    /// The text that was submitted when the job was scheduled
    pub text: String,
}

/// Denormalized data handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackNotice {
    pub feedback_id: FeedbackId,
    pub sender: UserProfile,
    pub recipient: UserProfile,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

/// Credential for the recipient's connected social account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCredential {
    pub access_token: String,
    /// Member id on the external network, with or without URN prefix
    pub member_id: String,
}
