// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "feedback/mod.rs"]
pub mod feedback;

#[path = "moderation/mod.rs"]
pub mod moderation;
