//! # Registration Engine
//!
//! Registers the device with the messaging relay, then with the back end,
//! and skips every step whose inputs haven't changed since the last success.
//!
//! ## Registration Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    register_device(params)                              │
//! │                                                                         │
//! │  0. validate params ───────────────────────────── invalid ──► Err       │
//! │                                                                         │
//! │  1. relay needed?  (no relay id │ sender changed │ app version changed) │
//! │        yes ─► [sender changed] relay.unregister()   (failure logged)    │
//! │               relay.register(sender) ──────────── failure ──► Err       │
//! │  2.    save relay id, sender id, app version                            │
//! │                                                                         │
//! │  3. back end needed?  (relay id changed │ no device id │ any field)     │
//! │        yes ─► back_end.register_device(New | Update) ─ failure ─► Err   │
//! │  4.    save device id and every changed field                           │
//! │                                                                         │
//! │  5. geofencing on and (tags changed │ just enabled │ never fetched      │
//! │     │ last resync failed) ─► geofences.update(timestamp)                │
//! │        failure logged and remembered for the next registration          │
//! │  6. geofencing turned off ─► geofences.clear()      (failure logged)    │
//! │                                                                         │
//! │  7. Ok(())                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each stored field is written on its own, so a failure in step 3 keeps the
//! relay id saved in step 2.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{PushError, PushResult};
use crate::geofence::GeofenceSync;
use crate::prefs::PreferencesStore;
use crate::transport::{BackEndApi, Credentials, MessagingRelay, RegistrationKind};
use pushwire_core::{RegistrationParameters, StoredRegistration, NEVER_UPDATED_GEOFENCES};

/// Drives device registration against the relay and the back end.
pub struct RegistrationEngine {
    prefs: Arc<dyn PreferencesStore>,
    relay: Arc<dyn MessagingRelay>,
    back_end: Arc<dyn BackEndApi>,
    geofences: Arc<dyn GeofenceSync>,
    app: AppConfig,
    /// Whether this build supports geofencing at all.
    geofencing_available: bool,
}

impl RegistrationEngine {
    pub fn new(
        prefs: Arc<dyn PreferencesStore>,
        relay: Arc<dyn MessagingRelay>,
        back_end: Arc<dyn BackEndApi>,
        geofences: Arc<dyn GeofenceSync>,
        app: AppConfig,
        geofencing_available: bool,
    ) -> Self {
        RegistrationEngine {
            prefs,
            relay,
            back_end,
            geofences,
            app,
            geofencing_available,
        }
    }

    /// Registers (or re-registers) the device.
    ///
    /// ## Errors
    /// The first failure of a required step. The error's `Display` text is
    /// the reason reported to the host, e.g.
    /// `Back-end server returned HTTP status 500`.
    pub async fn register_device(&self, params: &RegistrationParameters) -> PushResult<()> {
        params.validate()?;
        let credentials = Credentials::from_params(params)?;

        let stored = self.prefs.load().await?;
        let relay_device_id = self.ensure_relay_registration(params, &stored).await?;
        self.ensure_back_end_registration(params, &stored, &relay_device_id)
            .await?;
        self.sync_geofences(params, &stored, &credentials).await?;

        info!(sender_id = %params.sender_id(), "Device registration complete");
        Ok(())
    }

    /// Steps 1 and 2. Returns the relay id to register with the back end.
    async fn ensure_relay_registration(
        &self,
        params: &RegistrationParameters,
        stored: &StoredRegistration,
    ) -> PushResult<String> {
        if !stored.needs_relay_registration(params, self.app.version) {
            if let Some(relay_device_id) = &stored.relay_device_id {
                debug!("Relay registration unchanged, skipping");
                return Ok(relay_device_id.clone());
            }
        }

        if stored.relay_device_id.is_some() && stored.sender_id_changed(params) {
            match self.relay.unregister().await {
                Ok(()) => {
                    info!("Unregistered previous sender from relay");
                    self.prefs.set_relay_device_id(None).await?;
                }
                Err(e) => warn!(error = %e, "Relay unregistration failed, continuing"),
            }
        }

        let relay_device_id = self
            .relay
            .register(params.sender_id())
            .await
            .map_err(|e| {
                error!(error = %e, sender_id = %params.sender_id(), "Relay registration failed");
                e
            })?;
        if relay_device_id.trim().is_empty() {
            return Err(PushError::RelayRegistrationFailed(
                "Relay returned an empty device id".into(),
            ));
        }

        self.prefs.set_relay_device_id(Some(&relay_device_id)).await?;
        self.prefs.set_sender_id(Some(params.sender_id())).await?;
        self.prefs.set_app_version(Some(self.app.version)).await?;
        info!("Relay registration saved");

        Ok(relay_device_id)
    }

    /// Steps 3 and 4.
    async fn ensure_back_end_registration(
        &self,
        params: &RegistrationParameters,
        stored: &StoredRegistration,
        relay_device_id: &str,
    ) -> PushResult<()> {
        let relay_changed = stored.relay_device_id.as_deref() != Some(relay_device_id);
        let needed = relay_changed
            || stored.back_end_device_id.is_none()
            || stored.back_end_fields_changed(params, &self.app.package_name);
        if !needed {
            debug!("Back-end registration unchanged, skipping");
            return Ok(());
        }

        let kind = match &stored.back_end_device_id {
            Some(previous_device_id) => RegistrationKind::Update {
                previous_device_id: previous_device_id.clone(),
            },
            None => RegistrationKind::New,
        };

        let device_id = self
            .back_end
            .register_device(relay_device_id, &kind, params, &stored.tags)
            .await
            .map_err(|e| {
                error!(error = %e, "Back-end registration failed");
                e
            })?;
        if device_id.trim().is_empty() {
            return Err(PushError::MissingDeviceUuid);
        }

        self.save_back_end_fields(params, stored, &device_id).await?;
        info!(device_id = %device_id, new = matches!(kind, RegistrationKind::New), "Back-end registration saved");
        Ok(())
    }

    async fn save_back_end_fields(
        &self,
        params: &RegistrationParameters,
        stored: &StoredRegistration,
        device_id: &str,
    ) -> PushResult<()> {
        if stored.back_end_device_id.as_deref() != Some(device_id) {
            self.prefs.set_back_end_device_id(Some(device_id)).await?;
        }
        if stored.platform_uuid.as_deref() != Some(params.platform_uuid()) {
            self.prefs.set_platform_uuid(Some(params.platform_uuid())).await?;
        }
        if stored.platform_secret.as_deref() != Some(params.platform_secret()) {
            self.prefs
                .set_platform_secret(Some(params.platform_secret()))
                .await?;
        }
        if stored.device_alias.as_deref() != params.device_alias() {
            self.prefs.set_device_alias(params.device_alias()).await?;
        }
        if stored.package_name.as_deref() != Some(self.app.package_name.as_str()) {
            self.prefs
                .set_package_name(Some(&self.app.package_name))
                .await?;
        }
        if stored.service_url.as_deref() != Some(params.service_url()) {
            self.prefs.set_service_url(Some(params.service_url())).await?;
        }
        if stored.tags_changed(params) {
            self.prefs.set_tags(params.tags()).await?;
        }
        Ok(())
    }

    /// Steps 5 and 6. Geofence failures are logged, never returned.
    async fn sync_geofences(
        &self,
        params: &RegistrationParameters,
        stored: &StoredRegistration,
        credentials: &Credentials,
    ) -> PushResult<()> {
        let was_enabled = self.geofencing_available && stored.geofences_enabled;
        let is_enabled = self.geofencing_available && params.geofences_enabled();
        let mut resync_pending = stored.geofence_resync_pending;

        if is_enabled {
            let resync = resync_pending
                || stored.tags_changed(params)
                || !was_enabled
                || !stored.has_fetched_geofences();
            if resync {
                let timestamp = if was_enabled {
                    stored.last_geofence_update
                } else {
                    NEVER_UPDATED_GEOFENCES
                };
                match self.geofences.update(credentials, timestamp).await {
                    Ok(()) => resync_pending = false,
                    Err(e) => {
                        warn!(error = %e, timestamp, "Geofence update failed, retrying on next registration");
                        resync_pending = true;
                    }
                }
            }
        } else {
            resync_pending = false;
            if was_enabled {
                if let Err(e) = self.geofences.clear().await {
                    warn!(error = %e, "Clearing geofences failed, continuing");
                }
            }
        }

        if resync_pending != stored.geofence_resync_pending {
            self.prefs.set_geofence_resync_pending(resync_pending).await?;
        }
        if stored.geofences_enabled != params.geofences_enabled() {
            self.prefs
                .set_geofences_enabled(params.geofences_enabled())
                .await?;
        }
        Ok(())
    }

    /// Unregisters the device from the relay and the back end.
    ///
    /// Relay and geofence failures are logged; a back-end failure is
    /// returned and leaves the stored back-end id in place.
    pub async fn unregister_device(&self, params: &RegistrationParameters) -> PushResult<()> {
        params.validate()?;
        let credentials = Credentials::from_params(params)?;
        let stored = self.prefs.load().await?;

        match self.relay.unregister().await {
            Ok(()) => self.prefs.set_relay_device_id(None).await?,
            Err(e) => warn!(error = %e, "Relay unregistration failed, continuing"),
        }

        if self.geofencing_available && stored.geofences_enabled {
            if let Err(e) = self.geofences.clear().await {
                warn!(error = %e, "Clearing geofences failed, continuing");
            }
        }

        let Some(device_id) = stored.back_end_device_id.as_deref() else {
            debug!("No back-end device id stored, nothing to unregister");
            return Ok(());
        };

        self.back_end
            .unregister_device(device_id, &credentials)
            .await
            .map_err(|e| {
                error!(error = %e, device_id = %device_id, "Back-end unregistration failed");
                e
            })?;

        self.prefs.set_relay_device_id(None).await?;
        self.prefs.set_back_end_device_id(None).await?;
        self.prefs.set_tags(&Default::default()).await?;
        self.prefs
            .set_last_geofence_update(NEVER_UPDATED_GEOFENCES)
            .await?;

        info!(device_id = %device_id, "Device unregistered");
        Ok(())
    }

    /// Forgets every stored registration field.
    pub async fn clear_registration(&self) -> PushResult<()> {
        self.prefs.clear_all().await?;
        info!("Stored registration cleared");
        Ok(())
    }
}
