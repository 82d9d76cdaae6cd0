// Core feedback module - lifecycle, caller API and moderation orchestration.

pub mod feedback_models;
pub mod feedback_ports;
pub mod feedback_service;
pub mod lifecycle;
pub mod orchestrator;

pub use feedback_models::*;
pub use feedback_ports::*;
pub use feedback_service::FeedbackService;
pub use lifecycle::{Applied, Effect, Transition};
pub use orchestrator::ModerationOrchestrator;
