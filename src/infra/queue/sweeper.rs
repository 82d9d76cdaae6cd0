// Periodic re-queue of feedback still awaiting moderation.
//
// Rows can reach `pending_review` without passing through this process's
// queue: written by another front-end sharing the database, left behind by a
// failed enqueue, or lost with a previous run's in-memory channel. The sweep
// lists them on a fixed interval and hands them to the queue again. A job
// that is already queued or running for the same item is harmless: the
// worker serializes per id and the orchestrator skips items that have left
// `pending_review`.

use crate::core::feedback::{FeedbackService, FeedbackStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Re-queue pending reviews every `every` until the handle is aborted.
///
/// The first sweep runs one interval after the call; callers do their own
/// startup sweep if they need one right away.
pub fn spawn_pending_sweep<S>(service: Arc<FeedbackService<S>>, every: Duration) -> JoinHandle<()>
where
    S: FeedbackStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match service.requeue_pending_reviews().await {
                Ok(0) => debug!("Sweep found no feedback awaiting moderation"),
                Ok(count) => info!(count, "Sweep re-queued feedback awaiting moderation"),
                Err(e) => error!("Sweep for pending feedback failed: {}", e),
            }
        }
    })
}
