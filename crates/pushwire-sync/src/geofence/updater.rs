use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::engine::GeofenceEngine;
use crate::error::{PushError, PushResult};
use crate::prefs::PreferencesStore;
use crate::transport::{BackEndApi, Credentials};
use pushwire_core::NEVER_UPDATED_GEOFENCES;

/// What the registration engine needs from geofencing.
#[async_trait]
pub trait GeofenceSync: Send + Sync {
    /// Fetches changes since `timestamp` and applies them. On success the
    /// server's `last_modified` becomes the stored timestamp.
    async fn update(&self, credentials: &Credentials, timestamp: i64) -> PushResult<()>;

    /// Drops every geofence and forgets the stored timestamp.
    async fn clear(&self) -> PushResult<()>;
}

/// Pulls geofences from the back end into a [`GeofenceEngine`].
pub struct GeofenceUpdater {
    engine: Arc<GeofenceEngine>,
    back_end: Arc<dyn BackEndApi>,
    prefs: Arc<dyn PreferencesStore>,
}

impl GeofenceUpdater {
    pub fn new(
        engine: Arc<GeofenceEngine>,
        back_end: Arc<dyn BackEndApi>,
        prefs: Arc<dyn PreferencesStore>,
    ) -> Self {
        GeofenceUpdater {
            engine,
            back_end,
            prefs,
        }
    }
}

#[async_trait]
impl GeofenceSync for GeofenceUpdater {
    async fn update(&self, credentials: &Credentials, timestamp: i64) -> PushResult<()> {
        let response = self
            .back_end
            .fetch_geofences(timestamp, credentials)
            .await
            .map_err(|e| {
                warn!(timestamp, error = %e, "Geofence fetch failed");
                PushError::GeofenceUpdateFailed(e.to_string())
            })?;

        self.engine.process_response(&response, timestamp).await?;
        self.prefs
            .set_last_geofence_update(response.last_modified)
            .await?;

        info!(
            since = timestamp,
            last_modified = response.last_modified,
            "Geofences synchronised"
        );
        Ok(())
    }

    async fn clear(&self) -> PushResult<()> {
        self.engine.clear().await?;
        self.prefs
            .set_last_geofence_update(NEVER_UPDATED_GEOFENCES)
            .await
    }
}
