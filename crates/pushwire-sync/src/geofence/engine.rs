use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PushResult;
use crate::protocol::GeofenceResponse;
use crate::store::GeofenceStore;
use pushwire_core::geofence::parse_request_id;
use pushwire_core::{
    GeofenceDataList, GeofenceLocationMap, GeofenceTransition, TagSet, NEVER_UPDATED_GEOFENCES,
};

// =============================================================================
// Collaborators
// =============================================================================

/// Platform location service that monitors regions.
///
/// Implementations report a rejected region set as
/// [`crate::PushError::GeofenceRegistrationFailed`].
#[async_trait]
pub trait GeofenceRegistrar: Send + Sync {
    /// Replaces every monitored region with `locations`.
    async fn register_all(
        &self,
        locations: &GeofenceLocationMap,
        geofences: &GeofenceDataList,
    ) -> PushResult<()>;

    async fn unregister_all(&self) -> PushResult<()>;
}

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// A transition reported by the platform for one or more regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceTrigger {
    pub transition: GeofenceTransition,
    /// Platform request ids, `PUSH_<geofence id>_<location id>`.
    pub request_ids: Vec<String>,
}

/// A transition that passed every filter and should reach the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceNotification {
    pub transition: GeofenceTransition,
    pub geofence_id: i64,
    pub location_id: i64,
    pub data: BTreeMap<String, String>,
}

// =============================================================================
// Geofence Engine
// =============================================================================

/// Owns the persisted geofence set and its registration with the platform.
pub struct GeofenceEngine {
    store: Arc<dyn GeofenceStore>,
    registrar: Arc<dyn GeofenceRegistrar>,
    clock: Arc<dyn Clock>,
}

impl GeofenceEngine {
    pub fn new(
        store: Arc<dyn GeofenceStore>,
        registrar: Arc<dyn GeofenceRegistrar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        GeofenceEngine {
            store,
            registrar,
            clock,
        }
    }

    /// Applies a server response to the persisted set and re-registers the
    /// result.
    ///
    /// ## Arguments
    /// * `response` - What the server returned
    /// * `timestamp` - The timestamp the request was made with; `0` means the
    ///   response is the complete set
    ///
    /// ## Returns
    /// The geofence set now persisted.
    pub async fn process_response(
        &self,
        response: &GeofenceResponse,
        timestamp: i64,
    ) -> PushResult<GeofenceDataList> {
        let now = self.clock.now();

        let mut incoming = response.geofence_list();
        let rejected = incoming.retain_valid(now);
        if rejected > 0 {
            warn!(count = rejected, "Dropped invalid or expired geofences from server");
        }

        let current = if timestamp == NEVER_UPDATED_GEOFENCES {
            self.store.replace_all(&incoming).await?;
            incoming
        } else {
            if !response.deleted_geofence_ids.is_empty() {
                self.store.remove_ids(&response.deleted_geofence_ids).await?;
            }
            self.store.add_all(&incoming).await?;

            let mut current = self.store.load_all().await?;
            let expired = current.retain_valid(now);
            if expired > 0 {
                debug!(count = expired, "Dropping expired geofences");
                self.store.replace_all(&current).await?;
            }
            current
        };

        info!(
            count = current.len(),
            full = timestamp == NEVER_UPDATED_GEOFENCES,
            deleted = response.deleted_geofence_ids.len(),
            "Geofence set updated"
        );

        self.sync_registrar(&current).await?;
        Ok(current)
    }

    /// Registers the persisted set again, e.g. after the device rebooted.
    ///
    /// ## Returns
    /// Number of geofences registered.
    pub async fn reregister_current_locations(&self) -> PushResult<usize> {
        let mut current = self.store.load_all().await?;

        let expired = current.retain_valid(self.clock.now());
        if expired > 0 {
            debug!(count = expired, "Dropping expired geofences");
            self.store.replace_all(&current).await?;
        }

        self.sync_registrar(&current).await?;
        Ok(current.len())
    }

    /// Filters a platform transition down to what the host should see.
    ///
    /// A request id is dropped when it doesn't parse, its geofence is
    /// unknown, the geofence's tags miss `subscribed_tags`, its trigger type
    /// ignores this transition, or it has no payload.
    pub async fn handle_transition(
        &self,
        trigger: &GeofenceTrigger,
        subscribed_tags: &TagSet,
    ) -> PushResult<Vec<GeofenceNotification>> {
        let geofences = self.store.load_all().await?;
        let mut notifications = Vec::new();

        for request_id in &trigger.request_ids {
            let (geofence_id, location_id) = match parse_request_id(request_id) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Ignoring transition");
                    continue;
                }
            };

            let Some(geofence) = geofences.get(geofence_id) else {
                warn!(geofence_id, "Transition for unknown geofence");
                continue;
            };

            if !geofence.is_subscribed_to_tag(subscribed_tags) {
                debug!(geofence_id, "Geofence not subscribed to any device tag");
                continue;
            }

            let accepted = geofence
                .trigger_type
                .map_or(false, |t| t.accepts(trigger.transition));
            if !accepted {
                debug!(geofence_id, transition = ?trigger.transition, "Trigger type ignores transition");
                continue;
            }

            if geofence.data.is_empty() {
                debug!(geofence_id, "Geofence has no payload");
                continue;
            }

            notifications.push(GeofenceNotification {
                transition: trigger.transition,
                geofence_id,
                location_id,
                data: geofence.data.clone(),
            });
        }

        Ok(notifications)
    }

    /// Unregisters everything and wipes the persisted set.
    pub async fn clear(&self) -> PushResult<()> {
        let unregistered = self.registrar.unregister_all().await;
        if let Err(e) = &unregistered {
            warn!(error = %e, "Failed to unregister geofences");
        }
        self.store.reset().await?;
        info!("Geofences cleared");
        unregistered
    }

    async fn sync_registrar(&self, geofences: &GeofenceDataList) -> PushResult<()> {
        if geofences.is_empty() {
            return self.registrar.unregister_all().await;
        }
        let locations = geofences.location_map();
        debug!(regions = locations.len(), "Registering geofence regions");
        self.registrar
            .register_all(&locations, geofences)
            .await
            .map_err(|e| {
                warn!(error = %e, regions = locations.len(), "Region registration rejected");
                e
            })
    }
}
