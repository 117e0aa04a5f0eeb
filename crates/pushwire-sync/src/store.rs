//! # Storage Seams
//!
//! Traits the job pipeline and the geofence engine use for local state, and
//! their pushwire-db implementations.
//!
//! ```text
//! JobRunner ──► EventStorage  ──► EventRepository   (SQLite events table)
//! Geofences ──► GeofenceStore ──► GeofenceFileStore (geofences.json)
//! ```

use async_trait::async_trait;

use crate::error::PushResult;
use pushwire_core::{Event, EventStatus, GeofenceData, GeofenceDataList};
use pushwire_db::{EventHandle, EventRepository, GeofenceFileStore};

// =============================================================================
// Event Storage
// =============================================================================

/// Queue of analytics events addressed by opaque handles.
#[async_trait]
pub trait EventStorage: Send + Sync {
    async fn save(&self, event: &Event) -> PushResult<EventHandle>;

    async fn read(&self, handle: EventHandle) -> PushResult<Option<Event>>;

    /// Reads several events, skipping handles that no longer exist.
    async fn read_many(&self, handles: &[EventHandle]) -> PushResult<Vec<(EventHandle, Event)>>;

    /// Handles in any of `statuses`, oldest first, at most `limit` of them.
    async fn handles_with_status(
        &self,
        statuses: &[EventStatus],
        limit: Option<u32>,
    ) -> PushResult<Vec<EventHandle>>;

    async fn set_status(&self, handles: &[EventHandle], status: EventStatus) -> PushResult<u64>;

    async fn delete(&self, handles: &[EventHandle]) -> PushResult<u64>;

    async fn count(&self, statuses: &[EventStatus]) -> PushResult<i64>;
}

#[async_trait]
impl EventStorage for EventRepository {
    async fn save(&self, event: &Event) -> PushResult<EventHandle> {
        Ok(EventRepository::save(self, event).await?)
    }

    async fn read(&self, handle: EventHandle) -> PushResult<Option<Event>> {
        Ok(EventRepository::read(self, handle).await?)
    }

    async fn read_many(&self, handles: &[EventHandle]) -> PushResult<Vec<(EventHandle, Event)>> {
        Ok(EventRepository::read_many(self, handles).await?)
    }

    async fn handles_with_status(
        &self,
        statuses: &[EventStatus],
        limit: Option<u32>,
    ) -> PushResult<Vec<EventHandle>> {
        Ok(EventRepository::handles_with_status(self, statuses, limit).await?)
    }

    async fn set_status(&self, handles: &[EventHandle], status: EventStatus) -> PushResult<u64> {
        Ok(EventRepository::set_status(self, handles, status).await?)
    }

    async fn delete(&self, handles: &[EventHandle]) -> PushResult<u64> {
        Ok(EventRepository::delete(self, handles).await?)
    }

    async fn count(&self, statuses: &[EventStatus]) -> PushResult<i64> {
        Ok(EventRepository::count(self, statuses).await?)
    }
}

// =============================================================================
// Geofence Store
// =============================================================================

/// Persisted geofence set.
#[async_trait]
pub trait GeofenceStore: Send + Sync {
    async fn load_all(&self) -> PushResult<GeofenceDataList>;

    async fn get(&self, id: i64) -> PushResult<Option<GeofenceData>>;

    async fn replace_all(&self, geofences: &GeofenceDataList) -> PushResult<()>;

    async fn add_all(&self, geofences: &GeofenceDataList) -> PushResult<()>;

    async fn remove_ids(&self, ids: &[i64]) -> PushResult<()>;

    async fn reset(&self) -> PushResult<()>;
}

#[async_trait]
impl GeofenceStore for GeofenceFileStore {
    async fn load_all(&self) -> PushResult<GeofenceDataList> {
        Ok(GeofenceFileStore::load_all(self).await?)
    }

    async fn get(&self, id: i64) -> PushResult<Option<GeofenceData>> {
        Ok(GeofenceFileStore::get(self, id).await?)
    }

    async fn replace_all(&self, geofences: &GeofenceDataList) -> PushResult<()> {
        Ok(GeofenceFileStore::replace_all(self, geofences).await?)
    }

    async fn add_all(&self, geofences: &GeofenceDataList) -> PushResult<()> {
        Ok(GeofenceFileStore::add_all(self, geofences).await?)
    }

    async fn remove_ids(&self, ids: &[i64]) -> PushResult<()> {
        Ok(GeofenceFileStore::remove_ids(self, ids).await?)
    }

    async fn reset(&self) -> PushResult<()> {
        Ok(GeofenceFileStore::reset(self).await?)
    }
}
