// In-process moderation queue backed by a tokio channel.
//
// The queue side is handed to FeedbackService; the worker side drains the
// channel and runs each job on its own task. Jobs for different items run in
// parallel. Jobs for the same item wait on a per-item lock, so at most one
// moderation for a given id is ever in flight.

use crate::core::feedback::{
    FeedbackId, FeedbackStore, ModerationJob, ModerationOrchestrator, ModerationQueue, QueueError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

pub struct TokioModerationQueue {
    sender: mpsc::UnboundedSender<ModerationJob>,
}

impl TokioModerationQueue {
    /// Create a queue and the receiving end for a `ModerationWorker`.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ModerationJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ModerationQueue for TokioModerationQueue {
    async fn enqueue(&self, job: ModerationJob) -> Result<(), QueueError> {
        debug!(feedback_id = %job.feedback_id, "Queued moderation job");
        self.sender.send(job).map_err(|_| QueueError::Closed)
    }
}

// ============================================================================
// PER-ITEM LOCKS
// ============================================================================

/// One async mutex per feedback id, created on demand and dropped once no
/// task holds or waits for it.
#[derive(Default, Clone)]
pub struct FeedbackLocks {
    locks: Arc<DashMap<FeedbackId, Arc<Mutex<()>>>>,
}

pub struct FeedbackLockGuard {
    id: FeedbackId,
    locks: Arc<DashMap<FeedbackId, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl FeedbackLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: FeedbackId) -> FeedbackLockGuard {
        let mutex = Arc::clone(self.locks.entry(id).or_default().value());
        let guard = mutex.lock_owned().await;
        FeedbackLockGuard {
            id,
            locks: Arc::clone(&self.locks),
            _guard: guard,
        }
    }

    /// Number of ids with a live lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for FeedbackLockGuard {
    fn drop(&mut self) {
        // Two references left means only the map and this guard: nobody waits.
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}

// ============================================================================
// WORKER
// ============================================================================

pub struct ModerationWorker<S: FeedbackStore + 'static> {
    orchestrator: Arc<ModerationOrchestrator<S>>,
    locks: FeedbackLocks,
}

impl<S: FeedbackStore + 'static> ModerationWorker<S> {
    pub fn new(orchestrator: Arc<ModerationOrchestrator<S>>) -> Self {
        Self {
            orchestrator,
            locks: FeedbackLocks::new(),
        }
    }

    /// Start draining `receiver` in the background.
    ///
    /// The returned handle completes once every queue handle has been dropped
    /// and all jobs already received have finished.
    pub fn spawn(self, receiver: mpsc::UnboundedReceiver<ModerationJob>) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<ModerationJob>) {
        info!("Moderation worker started");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                job = receiver.recv() => match job {
                    Some(job) => {
                        let orchestrator = Arc::clone(&self.orchestrator);
                        let locks = self.locks.clone();
                        tasks.spawn(async move {
                            let _lock = locks.acquire(job.feedback_id).await;
                            orchestrator.moderate(job.feedback_id, &job.text).await;
                        });
                    }
                    None => break,
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!("Moderation task failed: {}", e);
                    }
                }
            }
        }

        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!("Moderation task failed: {}", e);
            }
        }
        info!("Moderation worker stopped");
    }
}
