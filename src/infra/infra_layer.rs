// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "feedback/mod.rs"]
pub mod feedback;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "queue/mod.rs"]
pub mod queue;

#[path = "notifications/mod.rs"]
pub mod notifications;

#[path = "sharing/mod.rs"]
pub mod sharing;
