// Hand-written stubs shared by the unit tests.

use crate::core::feedback::{
    Applied, ExternalCredential, ExternalPublisher, FeedbackError, FeedbackFilter, FeedbackId,
    FeedbackItem, FeedbackNotice, FeedbackStore, ModerationJob, ModerationQueue, Notifier,
    NotifyError, PublishError, QueueError, Transition, UserId,
};
use crate::core::moderation::{
    ModerationError, ModerationProvider, ModerationVerdict, ProviderResolver,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Response = Result<ModerationVerdict, ModerationError>;

// ============================================================================
// PROVIDERS
// ============================================================================

/// Provider that plays back scripted responses, then answers with a fallback.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Response>>,
    fallback: Box<dyn Fn(&str) -> Response + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Response>) -> Self {
        Self {
            name: "Scripted Provider".to_string(),
            script: Mutex::new(script.into()),
            fallback: Box::new(|_: &str| {
                Err(ModerationError::Transport("script exhausted".to_string()))
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call after the script with `response`.
    pub fn then_always(mut self, response: Response) -> Self {
        self.fallback = Box::new(move |_: &str| response.clone());
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn accepting() -> Self {
        Self::new(Vec::new()).then_always(Ok(ModerationVerdict::accept(serde_json::Value::Null)))
    }

    pub fn rejecting(category: &str) -> Self {
        Self::new(Vec::new()).then_always(Ok(ModerationVerdict::reject(
            vec![category.to_string()],
            format!("Your feedback was flagged for containing {}.", category),
            serde_json::Value::Null,
        )))
    }

    pub fn failing(error: ModerationError) -> Self {
        Self::new(Vec::new()).then_always(Err(error))
    }

    /// Rejects any text containing `word`, accepts everything else.
    pub fn keyword_filter(word: &str) -> Self {
        let word = word.to_lowercase();
        let mut provider = Self::new(Vec::new());
        provider.fallback = Box::new(move |text: &str| {
            if text.to_lowercase().contains(&word) {
                Ok(ModerationVerdict::reject(
                    vec!["insulting language".to_string()],
                    "Your feedback was flagged for containing insulting language.".to_string(),
                    serde_json::Value::Null,
                ))
            } else {
                Ok(ModerationVerdict::accept(serde_json::Value::Null))
            }
        });
        provider
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModerationProvider for ScriptedProvider {
    async fn moderate_content(&self, text: &str) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => (self.fallback)(text),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FailingResolver(String);

impl ProviderResolver for FailingResolver {
    fn resolve(&self) -> Result<Arc<dyn ModerationProvider>, ModerationError> {
        Err(ModerationError::Configuration(self.0.clone()))
    }
}

pub fn failing_resolver(message: &str) -> Arc<dyn ProviderResolver> {
    Arc::new(FailingResolver(message.to_string()))
}

// ============================================================================
// STORES
// ============================================================================

/// Wraps a store and fails the first `failures` transitions with a storage error.
pub struct FlakyStore<S: FeedbackStore> {
    inner: S,
    failures_left: AtomicUsize,
}

impl<S: FeedbackStore> FlakyStore<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl<S: FeedbackStore> FeedbackStore for FlakyStore<S> {
    async fn insert(&self, item: FeedbackItem) -> Result<(), FeedbackError> {
        self.inner.insert(item).await
    }

    async fn get(&self, id: FeedbackId) -> Result<Option<FeedbackItem>, FeedbackError> {
        self.inner.get(id).await
    }

    async fn apply_transition(
        &self,
        id: FeedbackId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Applied, FeedbackError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(FeedbackError::StorageError("disk I/O error".to_string()));
        }
        self.inner.apply_transition(id, transition, now).await
    }

    async fn delete(&self, id: FeedbackId, requester_id: UserId) -> Result<(), FeedbackError> {
        self.inner.delete(id, requester_id).await
    }

    async fn list(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackItem>, FeedbackError> {
        self.inner.list(filter).await
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<ModerationJob>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<ModerationJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModerationQueue for RecordingQueue {
    async fn enqueue(&self, job: ModerationJob) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<FeedbackId>>,
    rejected: Mutex<Vec<FeedbackId>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following notification fail.
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<FeedbackId> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn rejected(&self) -> Vec<FeedbackId> {
        self.rejected.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("mail server down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_delivered(&self, notice: &FeedbackNotice) -> Result<(), NotifyError> {
        self.check()?;
        self.delivered.lock().unwrap().push(notice.feedback_id);
        Ok(())
    }

    async fn notify_rejected(&self, notice: &FeedbackNotice) -> Result<(), NotifyError> {
        self.check()?;
        self.rejected.lock().unwrap().push(notice.feedback_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    posts: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalPublisher for RecordingPublisher {
    async fn publish(&self, _credential: &ExternalCredential, text: &str) -> Result<(), PublishError> {
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
