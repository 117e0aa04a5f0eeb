//! # Preferences Repository
//!
//! Durable key/value storage for the last known registration.
//!
//! Every value is stored as JSON so a single table can hold strings, numbers,
//! booleans and tag sets. Each `set` is its own committed write; with the
//! pool's FULL synchronous mode that write is on disk when `set` returns.
//!
//! ```text
//! key                      value
//! ───────────────────────  ─────────────────────────
//! relay_device_id          "fcm-token-..."
//! back_end_device_id       "4f0c..."
//! tags                     ["news","sports"]
//! app_version              42
//! last_geofence_update     1700000000000
//! geofences_enabled        true
//! ```

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Preference keys. One per field of a stored registration.
pub mod keys {
    pub const RELAY_DEVICE_ID: &str = "relay_device_id";
    pub const BACK_END_DEVICE_ID: &str = "back_end_device_id";
    pub const SENDER_ID: &str = "sender_id";
    pub const PLATFORM_UUID: &str = "platform_uuid";
    pub const PLATFORM_SECRET: &str = "platform_secret";
    pub const DEVICE_ALIAS: &str = "device_alias";
    pub const PACKAGE_NAME: &str = "package_name";
    pub const SERVICE_URL: &str = "service_url";
    pub const TAGS: &str = "tags";
    pub const APP_VERSION: &str = "app_version";
    pub const LAST_GEOFENCE_UPDATE: &str = "last_geofence_update";
    pub const GEOFENCES_ENABLED: &str = "geofences_enabled";
    pub const GEOFENCE_RESYNC_PENDING: &str = "geofence_resync_pending";
}

/// Repository for registration preferences.
#[derive(Debug, Clone)]
pub struct PreferencesRepository {
    pool: SqlitePool,
}

impl PreferencesRepository {
    /// Creates a new PreferencesRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PreferencesRepository { pool }
    }

    /// Reads a value. `None` if the key was never written or was removed.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let version: Option<i64> = prefs.get(keys::APP_VERSION).await?;
    /// ```
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        raw.map(|value| serde_json::from_str(&value).map_err(|e| DbError::corrupt(key, e)))
            .transpose()
    }

    /// Writes a value, replacing any previous one.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let encoded = serde_json::to_string(value).map_err(|e| DbError::corrupt(key, e))?;

        sqlx::query(
            r#"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&encoded)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, "Preference saved");
        Ok(())
    }

    /// Writes `Some(value)` or removes the key for `None`.
    pub async fn set_optional<T: Serialize + ?Sized>(&self, key: &str, value: Option<&T>) -> DbResult<()> {
        match value {
            Some(value) => self.set(key, value).await,
            None => self.remove(key).await,
        }
    }

    /// Removes a key. Removing a missing key is not an error.
    pub async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM preferences WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!(key = %key, "Preference removed");
        Ok(())
    }

    /// Removes every key.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM preferences")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
