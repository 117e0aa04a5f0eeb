//! # Preferences Store
//!
//! The registration engine's view of persisted registration state.
//!
//! Reads return the whole [`StoredRegistration`] snapshot; writes go field
//! by field so a registration that fails halfway keeps whatever it already
//! saved. [`PreferencesRepository`] is the SQLite-backed implementation.

use async_trait::async_trait;

use crate::error::PushResult;
use pushwire_core::{StoredRegistration, TagSet, NEVER_UPDATED_GEOFENCES};
use pushwire_db::{preference_keys as keys, PreferencesRepository};

/// Durable, typed key/value storage for registration state.
///
/// Every setter returns once the value is durable.
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Reads every stored field.
    async fn load(&self) -> PushResult<StoredRegistration>;

    async fn set_relay_device_id(&self, id: Option<&str>) -> PushResult<()>;
    async fn set_back_end_device_id(&self, id: Option<&str>) -> PushResult<()>;
    async fn set_sender_id(&self, sender_id: Option<&str>) -> PushResult<()>;
    async fn set_platform_uuid(&self, uuid: Option<&str>) -> PushResult<()>;
    async fn set_platform_secret(&self, secret: Option<&str>) -> PushResult<()>;
    async fn set_device_alias(&self, alias: Option<&str>) -> PushResult<()>;
    async fn set_package_name(&self, package_name: Option<&str>) -> PushResult<()>;
    async fn set_service_url(&self, url: Option<&str>) -> PushResult<()>;
    async fn set_tags(&self, tags: &TagSet) -> PushResult<()>;
    async fn set_app_version(&self, version: Option<i64>) -> PushResult<()>;
    async fn set_last_geofence_update(&self, timestamp: i64) -> PushResult<()>;
    async fn set_geofences_enabled(&self, enabled: bool) -> PushResult<()>;
    async fn set_geofence_resync_pending(&self, pending: bool) -> PushResult<()>;

    /// Wipes every field.
    async fn clear_all(&self) -> PushResult<()>;
}

#[async_trait]
impl PreferencesStore for PreferencesRepository {
    async fn load(&self) -> PushResult<StoredRegistration> {
        Ok(StoredRegistration {
            relay_device_id: self.get(keys::RELAY_DEVICE_ID).await?,
            back_end_device_id: self.get(keys::BACK_END_DEVICE_ID).await?,
            sender_id: self.get(keys::SENDER_ID).await?,
            platform_uuid: self.get(keys::PLATFORM_UUID).await?,
            platform_secret: self.get(keys::PLATFORM_SECRET).await?,
            device_alias: self.get(keys::DEVICE_ALIAS).await?,
            package_name: self.get(keys::PACKAGE_NAME).await?,
            service_url: self.get(keys::SERVICE_URL).await?,
            tags: self.get(keys::TAGS).await?.unwrap_or_default(),
            app_version: self.get(keys::APP_VERSION).await?,
            last_geofence_update: self
                .get(keys::LAST_GEOFENCE_UPDATE)
                .await?
                .unwrap_or(NEVER_UPDATED_GEOFENCES),
            geofences_enabled: self.get(keys::GEOFENCES_ENABLED).await?.unwrap_or(false),
            geofence_resync_pending: self
                .get(keys::GEOFENCE_RESYNC_PENDING)
                .await?
                .unwrap_or(false),
        })
    }

    async fn set_relay_device_id(&self, id: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::RELAY_DEVICE_ID, id).await?)
    }

    async fn set_back_end_device_id(&self, id: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::BACK_END_DEVICE_ID, id).await?)
    }

    async fn set_sender_id(&self, sender_id: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::SENDER_ID, sender_id).await?)
    }

    async fn set_platform_uuid(&self, uuid: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::PLATFORM_UUID, uuid).await?)
    }

    async fn set_platform_secret(&self, secret: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::PLATFORM_SECRET, secret).await?)
    }

    async fn set_device_alias(&self, alias: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::DEVICE_ALIAS, alias).await?)
    }

    async fn set_package_name(&self, package_name: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::PACKAGE_NAME, package_name).await?)
    }

    async fn set_service_url(&self, url: Option<&str>) -> PushResult<()> {
        Ok(self.set_optional(keys::SERVICE_URL, url).await?)
    }

    async fn set_tags(&self, tags: &TagSet) -> PushResult<()> {
        Ok(self.set(keys::TAGS, tags).await?)
    }

    async fn set_app_version(&self, version: Option<i64>) -> PushResult<()> {
        Ok(self.set_optional(keys::APP_VERSION, version.as_ref()).await?)
    }

    async fn set_last_geofence_update(&self, timestamp: i64) -> PushResult<()> {
        Ok(self.set(keys::LAST_GEOFENCE_UPDATE, &timestamp).await?)
    }

    async fn set_geofences_enabled(&self, enabled: bool) -> PushResult<()> {
        Ok(self.set(keys::GEOFENCES_ENABLED, &enabled).await?)
    }

    async fn set_geofence_resync_pending(&self, pending: bool) -> PushResult<()> {
        Ok(self.set(keys::GEOFENCE_RESYNC_PENDING, &pending).await?)
    }

    async fn clear_all(&self) -> PushResult<()> {
        self.clear().await?;
        Ok(())
    }
}
