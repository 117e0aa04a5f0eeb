//! # Event Repository
//!
//! Stores analytics events with a delivery status column.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  save(event)          INSERT ... status = 'not_posted'                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  send job             set_status(handles, 'posting')                    │
//! │       │               ── HTTP ──                                        │
//! │       ├── ok ───────► set_status(handles, 'posted')                     │
//! │       └── err ──────► set_status(handles, 'posting_error')              │
//! │                                                                         │
//! │  prepare job          'posting' → 'not_posted', DELETE 'posted'         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are addressed by an opaque [`EventHandle`] (the row id). Callers
//! never build SQL; status sets are passed as slices of [`EventStatus`].

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use pushwire_core::{Event, EventStatus};

/// Opaque handle of a stored event.
pub type EventHandle = i64;

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    status: EventStatus,
    payload: String,
}

impl EventRow {
    fn into_event(self) -> DbResult<(EventHandle, Event)> {
        let mut event: Event = serde_json::from_str(&self.payload)
            .map_err(|e| DbError::corrupt(format!("event {}", self.id), e))?;
        event.status = self.status;
        Ok((self.id, event))
    }
}

/// Repository for the analytics event queue.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    /// Creates a new EventRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventRepository { pool }
    }

    /// Stores an event with its current status and returns its handle.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let handle = repo.save(&Event::push_received("receipt-1", Utc::now())).await?;
    /// ```
    pub async fn save(&self, event: &Event) -> DbResult<EventHandle> {
        let payload =
            serde_json::to_string(event).map_err(|e| DbError::corrupt(event.id.as_str(), e))?;

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Storing event"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO events (event_uuid, event_type, status, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&event.id)
        .bind(event.event_type)
        .bind(event.status)
        .bind(&payload)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Reads one event. `None` if the handle is unknown.
    pub async fn read(&self, handle: EventHandle) -> DbResult<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as("SELECT id, status, payload FROM events WHERE id = ?1")
                .bind(handle)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_event().map(|(_, event)| event))
            .transpose()
    }

    /// Reads several events, skipping handles that no longer exist.
    pub async fn read_many(&self, handles: &[EventHandle]) -> DbResult<Vec<(EventHandle, Event)>> {
        let mut events = Vec::with_capacity(handles.len());
        for &handle in handles {
            if let Some(event) = self.read(handle).await? {
                events.push((handle, event));
            }
        }
        Ok(events)
    }

    /// Handles of every event in any of `statuses`, oldest first.
    ///
    /// ## Arguments
    /// * `statuses` - Status filter
    /// * `limit` - Maximum handles to return; `None` for all
    pub async fn handles_with_status(
        &self,
        statuses: &[EventStatus],
        limit: Option<u32>,
    ) -> DbResult<Vec<EventHandle>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT id FROM events WHERE status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(") ORDER BY id ASC");
        if let Some(limit) = limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let handles: Vec<EventHandle> = query
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;

        Ok(handles)
    }

    /// Moves every listed event to `status` in one transaction.
    ///
    /// ## Returns
    /// Number of events updated.
    pub async fn set_status(&self, handles: &[EventHandle], status: EventStatus) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for &handle in handles {
            let result = sqlx::query("UPDATE events SET status = ?1 WHERE id = ?2")
                .bind(status)
                .bind(handle)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;

        debug!(count = updated, status = %status, "Event status updated");
        Ok(updated)
    }

    /// Deletes the listed events in one transaction.
    pub async fn delete(&self, handles: &[EventHandle]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for &handle in handles {
            let result = sqlx::query("DELETE FROM events WHERE id = ?1")
                .bind(handle)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(count = deleted, "Events deleted");
        Ok(deleted)
    }

    /// Counts events in any of `statuses`.
    pub async fn count(&self, statuses: &[EventStatus]) -> DbResult<i64> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT COUNT(*) FROM events WHERE status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");

        let count: i64 = query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts every stored event regardless of status.
    pub async fn count_all(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use pushwire_core::EventType;

    async fn repo() -> EventRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().events()
    }

    fn event(receipt: &str, status: EventStatus) -> Event {
        let mut event = Event::push_received(receipt, Utc::now());
        event.status = status;
        event
    }

    #[tokio::test]
    async fn test_save_and_read() {
        let repo = repo().await;
        let original = event("receipt-1", EventStatus::NotPosted)
            .with_device(Some("device-1".to_string()), None);

        let handle = repo.save(&original).await.unwrap();
        let stored = repo.read(handle).await.unwrap().unwrap();

        assert_eq!(stored.id, original.id);
        assert_eq!(stored.event_type, EventType::PushReceived);
        assert_eq!(stored.receipt_id.as_deref(), Some("receipt-1"));
        assert_eq!(stored.device_uuid.as_deref(), Some("device-1"));
        assert_eq!(stored.status, EventStatus::NotPosted);
        assert_eq!(stored.time.timestamp_millis(), original.time.timestamp_millis());

        assert!(repo.read(handle + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handles_with_status_filters_and_orders() {
        let repo = repo().await;
        let a = repo.save(&event("a", EventStatus::NotPosted)).await.unwrap();
        let _b = repo.save(&event("b", EventStatus::Posted)).await.unwrap();
        let c = repo.save(&event("c", EventStatus::PostingError)).await.unwrap();
        let d = repo.save(&event("d", EventStatus::Posting)).await.unwrap();

        let pending = repo
            .handles_with_status(&EventStatus::PENDING, None)
            .await
            .unwrap();
        assert_eq!(pending, vec![a, c]);

        let limited = repo
            .handles_with_status(&EventStatus::PENDING, Some(1))
            .await
            .unwrap();
        assert_eq!(limited, vec![a]);

        let posting = repo
            .handles_with_status(&[EventStatus::Posting], None)
            .await
            .unwrap();
        assert_eq!(posting, vec![d]);

        assert!(repo.handles_with_status(&[], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_status_and_count() {
        let repo = repo().await;
        let a = repo.save(&event("a", EventStatus::NotPosted)).await.unwrap();
        let b = repo.save(&event("b", EventStatus::NotPosted)).await.unwrap();

        assert_eq!(repo.count(&[EventStatus::NotPosted]).await.unwrap(), 2);

        let updated = repo.set_status(&[a, b], EventStatus::Posting).await.unwrap();
        assert_eq!(updated, 2);
        assert_eq!(repo.count(&[EventStatus::NotPosted]).await.unwrap(), 0);
        assert_eq!(repo.count(&[EventStatus::Posting]).await.unwrap(), 2);

        let a_event = repo.read(a).await.unwrap().unwrap();
        assert_eq!(a_event.status, EventStatus::Posting);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo().await;
        let a = repo.save(&event("a", EventStatus::Posted)).await.unwrap();
        let b = repo.save(&event("b", EventStatus::NotPosted)).await.unwrap();

        assert_eq!(repo.delete(&[a]).await.unwrap(), 1);
        assert_eq!(repo.count_all().await.unwrap(), 1);
        assert!(repo.read(a).await.unwrap().is_none());
        assert!(repo.read(b).await.unwrap().is_some());

        let found = repo.read_many(&[a, b]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, b);
    }

    #[tokio::test]
    async fn test_duplicate_event_rejected() {
        let repo = repo().await;
        let e = event("a", EventStatus::NotPosted);
        repo.save(&e).await.unwrap();

        let err = repo.save(&e).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
