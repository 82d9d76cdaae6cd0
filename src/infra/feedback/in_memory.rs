// In-memory implementations of FeedbackStore and UserDirectory.
//
// Used by tests and by tooling that doesn't need persistence. Behaves like
// the SQLite store: every transition is checked and written under the
// DashMap shard lock for that id, so it is atomic per record.

use crate::core::feedback::{
    lifecycle, Applied, FeedbackError, FeedbackFilter, FeedbackId, FeedbackItem, FeedbackStore,
    Transition, UserDirectory, UserId, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// In-memory implementation of FeedbackStore.
///
/// **DashMap:**
/// A concurrent HashMap that's safe to use across multiple async tasks.
/// `get_mut` holds the shard lock while we validate and write, which is
/// what makes `apply_transition` a compare-and-set.
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    items: DashMap<FeedbackId, FeedbackItem>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn insert(&self, item: FeedbackItem) -> Result<(), FeedbackError> {
        if self.items.contains_key(&item.id) {
            return Err(FeedbackError::StorageError(format!(
                "feedback {} already exists",
                item.id
            )));
        }
        self.items.insert(item.id, item);
        Ok(())
    }

    async fn get(&self, id: FeedbackId) -> Result<Option<FeedbackItem>, FeedbackError> {
        Ok(self.items.get(&id).map(|entry| entry.value().clone()))
    }

    async fn apply_transition(
        &self,
        id: FeedbackId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Applied, FeedbackError> {
        let mut entry = self.items.get_mut(&id).ok_or(FeedbackError::NotFound(id))?;
        let applied = transition.apply(entry.value(), now)?;
        *entry.value_mut() = applied.item.clone();
        Ok(applied)
    }

    async fn delete(&self, id: FeedbackId, requester_id: UserId) -> Result<(), FeedbackError> {
        // remove_if re-checks under the shard lock
        let removed = self.items.remove_if(&id, |_, item| {
            lifecycle::check_delete(item, requester_id).is_ok()
        });
        if removed.is_some() {
            return Ok(());
        }

        let item = self
            .items
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(FeedbackError::NotFound(id))?;
        lifecycle::check_delete(&item, requester_id)?;

        // The item changed between the two lookups; report the state we saw.
        Err(FeedbackError::InvalidTransition(format!(
            "feedback {} was modified concurrently",
            id
        )))
    }

    async fn list(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackItem>, FeedbackError> {
        let mut items: Vec<FeedbackItem> = self
            .items
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        filter.sort(&mut items);
        Ok(items)
    }
}

/// In-memory user directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    /// Register a user with a fresh id.
    pub fn add_user(&self, email: &str, display_name: &str) -> UserProfile {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        };
        self.users.insert(profile.id, profile.clone());
        profile
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<UserProfile>, FeedbackError> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }
}
