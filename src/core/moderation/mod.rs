// Core moderation module - provider port, verdicts and retry policy.
// Concrete providers live in infra/moderation.

pub mod moderation_models;
pub mod moderation_provider;
pub mod retry_policy;

pub use moderation_models::*;
pub use moderation_provider::*;
pub use retry_policy::*;
