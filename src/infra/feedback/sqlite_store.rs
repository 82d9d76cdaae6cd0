// SQLite-backed feedback store.
//
// Tables:
// - feedback: One row per feedback item, plus a `revision` counter used for
//   compare-and-set updates
// - users: Display data for the notification collaborator

use crate::core::feedback::{
    lifecycle, Applied, FeedbackError, FeedbackFilter, FeedbackId, FeedbackItem, FeedbackOrder,
    FeedbackStatus, FeedbackStore, Transition, UserDirectory, UserId, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// How often a compare-and-set write is retried after losing a race
/// before the caller gets `InvalidTransition`.
const MAX_WRITE_ATTEMPTS: usize = 3;

const SELECT_COLUMNS: &str = "SELECT id, sender_id, recipient_id, original_text, modified_text, \
     status, ai_feedback, is_published, created_at, updated_at, delivered_at, published_at, \
     revision FROM feedback";

pub struct SqliteFeedbackStore {
    pool: Pool<Sqlite>,
}

impl SqliteFeedbackStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") {
            if let Some(parent) = Path::new(path_str).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                original_text TEXT NOT NULL,
                modified_text TEXT,
                status TEXT NOT NULL,
                ai_feedback TEXT,
                is_published BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                delivered_at TEXT,
                published_at TEXT,
                revision INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_recipient ON feedback(recipient_id, status);
            CREATE INDEX IF NOT EXISTS idx_feedback_sender ON feedback(sender_id);
            CREATE INDEX IF NOT EXISTS idx_feedback_status ON feedback(status);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or refresh a user's display data.
    pub async fn upsert_user(&self, profile: &UserProfile) -> Result<(), FeedbackError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET email = excluded.email, display_name = excluded.display_name
            "#,
        )
        .bind(profile.id.to_string())
        .bind(&profile.email)
        .bind(&profile.display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| FeedbackError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn fetch(&self, id: FeedbackId) -> Result<Option<(FeedbackItem, i64)>, FeedbackError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FeedbackError::StorageError(e.to_string()))?;

        match row {
            Some(row) => {
                let revision: i64 = row.get("revision");
                Ok(Some((row_to_item(&row)?, revision)))
            }
            None => Ok(None),
        }
    }

    /// Write `item` only if the row is still at `revision`.
    async fn compare_and_set(
        &self,
        item: &FeedbackItem,
        revision: i64,
    ) -> Result<bool, FeedbackError> {
        let result = sqlx::query(
            r#"
            UPDATE feedback SET
                original_text = ?,
                modified_text = ?,
                status = ?,
                ai_feedback = ?,
                is_published = ?,
                updated_at = ?,
                delivered_at = ?,
                published_at = ?,
                revision = revision + 1
            WHERE id = ? AND revision = ?
            "#,
        )
        .bind(&item.original_text)
        .bind(&item.modified_text)
        .bind(item.status.as_str())
        .bind(&item.ai_feedback)
        .bind(item.is_published)
        .bind(format_timestamp(&item.updated_at))
        .bind(item.delivered_at.as_ref().map(format_timestamp))
        .bind(item.published_at.as_ref().map(format_timestamp))
        .bind(item.id.to_string())
        .bind(revision)
        .execute(&self.pool)
        .await
        .map_err(|e| FeedbackError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl FeedbackStore for SqliteFeedbackStore {
    async fn insert(&self, item: FeedbackItem) -> Result<(), FeedbackError> {
        sqlx::query(
            r#"
            INSERT INTO feedback (
                id, sender_id, recipient_id, original_text, modified_text, status,
                ai_feedback, is_published, created_at, updated_at, delivered_at, published_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.sender_id.to_string())
        .bind(item.recipient_id.to_string())
        .bind(&item.original_text)
        .bind(&item.modified_text)
        .bind(item.status.as_str())
        .bind(&item.ai_feedback)
        .bind(item.is_published)
        .bind(format_timestamp(&item.created_at))
        .bind(format_timestamp(&item.updated_at))
        .bind(item.delivered_at.as_ref().map(format_timestamp))
        .bind(item.published_at.as_ref().map(format_timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| FeedbackError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: FeedbackId) -> Result<Option<FeedbackItem>, FeedbackError> {
        Ok(self.fetch(id).await?.map(|(item, _)| item))
    }

    async fn apply_transition(
        &self,
        id: FeedbackId,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Applied, FeedbackError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (current, revision) = self.fetch(id).await?.ok_or(FeedbackError::NotFound(id))?;
            let applied = transition.apply(&current, now)?;

            if self.compare_and_set(&applied.item, revision).await? {
                return Ok(applied);
            }
            debug!(
                "Lost write race on feedback {} ({}), attempt {}",
                id,
                transition.name(),
                attempt
            );
        }

        Err(FeedbackError::InvalidTransition(format!(
            "feedback {} is being modified concurrently",
            id
        )))
    }

    async fn delete(&self, id: FeedbackId, requester_id: UserId) -> Result<(), FeedbackError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let (current, revision) = self.fetch(id).await?.ok_or(FeedbackError::NotFound(id))?;
            lifecycle::check_delete(&current, requester_id)?;

            let result = sqlx::query("DELETE FROM feedback WHERE id = ? AND revision = ?")
                .bind(id.to_string())
                .bind(revision)
                .execute(&self.pool)
                .await
                .map_err(|e| FeedbackError::StorageError(e.to_string()))?;

            if result.rows_affected() == 1 {
                return Ok(());
            }
        }

        Err(FeedbackError::InvalidTransition(format!(
            "feedback {} is being modified concurrently",
            id
        )))
    }

    async fn list(&self, filter: &FeedbackFilter) -> Result<Vec<FeedbackItem>, FeedbackError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        query.push(" WHERE 1 = 1");

        if let Some(recipient_id) = filter.recipient_id {
            query
                .push(" AND recipient_id = ")
                .push_bind(recipient_id.to_string());
        }
        if let Some(sender_id) = filter.sender_id {
            query.push(" AND sender_id = ").push_bind(sender_id.to_string());
        }
        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(is_published) = filter.is_published {
            query.push(" AND is_published = ").push_bind(is_published);
        }

        // Timestamps are fixed-width UTC strings, so text order is time order.
        // SQLite puts NULLs last when sorting DESC.
        match filter.order {
            FeedbackOrder::NewestFirst => query.push(" ORDER BY created_at DESC"),
            FeedbackOrder::RecentlyPublishedFirst => {
                query.push(" ORDER BY published_at DESC, created_at DESC")
            }
        };

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FeedbackError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_item).collect()
    }
}

#[async_trait]
impl UserDirectory for SqliteFeedbackStore {
    async fn find_user(&self, id: UserId) -> Result<Option<UserProfile>, FeedbackError> {
        let row = sqlx::query("SELECT id, email, display_name FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FeedbackError::StorageError(e.to_string()))?;

        row.map(|row| {
            Ok(UserProfile {
                id: parse_uuid(&row, "id")?,
                email: row.get("email"),
                display_name: row.get("display_name"),
            })
        })
        .transpose()
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FeedbackError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| FeedbackError::StorageError(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_optional_timestamp(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, FeedbackError> {
    row.get::<Option<String>, _>(column)
        .as_deref()
        .map(parse_timestamp)
        .transpose()
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, FeedbackError> {
    let raw: String = row.get(column);
    Uuid::parse_str(&raw)
        .map_err(|e| FeedbackError::StorageError(format!("bad {} '{}': {}", column, raw, e)))
}

fn row_to_item(row: &SqliteRow) -> Result<FeedbackItem, FeedbackError> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(FeedbackItem {
        id: parse_uuid(row, "id")?,
        sender_id: parse_uuid(row, "sender_id")?,
        recipient_id: parse_uuid(row, "recipient_id")?,
        original_text: row.get("original_text"),
        modified_text: row.get("modified_text"),
        status: FeedbackStatus::from_str(&status)?,
        ai_feedback: row.get("ai_feedback"),
        is_published: row.get("is_published"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        delivered_at: parse_optional_timestamp(row, "delivered_at")?,
        published_at: parse_optional_timestamp(row, "published_at")?,
    })
}
