// Background execution of moderation jobs.

pub mod sweeper;
pub mod tokio_queue;

pub use sweeper::spawn_pending_sweep;
pub use tokio_queue::{FeedbackLocks, ModerationWorker, TokioModerationQueue};
