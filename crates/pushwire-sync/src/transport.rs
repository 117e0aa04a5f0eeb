//! # Network Transport Seams
//!
//! The two remote parties a device talks to, expressed as injectable traits.
//!
//! ```text
//!                ┌────────────────────┐
//!   register ───►│  MessagingRelay    │  platform token service (host-provided)
//!                └────────────────────┘
//!                ┌────────────────────┐
//!   register ───►│  BackEndApi        │  application server (HttpBackEnd)
//!   analytics ──►│                    │
//!   geofences ──►│                    │
//!                └────────────────────┘
//! ```
//!
//! Every call resolves to a [`PushResult`]; the `Display` text of the error is
//! the failure reason reported upstream.

use async_trait::async_trait;
use url::Url;

use crate::error::{PushError, PushResult};
use crate::protocol::GeofenceResponse;
use pushwire_core::validation::parse_service_url;
use pushwire_core::{Event, RegistrationParameters, StoredRegistration, TagSet};

// =============================================================================
// Credentials
// =============================================================================

/// Where and as whom to talk to the back end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: Url,
    pub platform_uuid: String,
    pub platform_secret: String,
}

impl Credentials {
    /// Credentials for the parameters of a registration in progress.
    pub fn from_params(params: &RegistrationParameters) -> PushResult<Self> {
        Ok(Credentials {
            base_url: parse_service_url(params.service_url())?,
            platform_uuid: params.platform_uuid().to_string(),
            platform_secret: params.platform_secret().to_string(),
        })
    }

    /// Credentials saved by the last successful registration.
    ///
    /// Fails with [`PushError::NotRegistered`] if any part is missing.
    pub fn from_stored(stored: &StoredRegistration) -> PushResult<Self> {
        let (Some(url), Some(uuid), Some(secret)) = (
            stored.service_url.as_deref(),
            stored.platform_uuid.as_deref(),
            stored.platform_secret.as_deref(),
        ) else {
            return Err(PushError::NotRegistered(
                "no stored back-end credentials".into(),
            ));
        };

        Ok(Credentials {
            base_url: parse_service_url(url)?,
            platform_uuid: uuid.to_string(),
            platform_secret: secret.to_string(),
        })
    }
}

// =============================================================================
// Messaging Relay
// =============================================================================

/// Platform push token service.
#[async_trait]
pub trait MessagingRelay: Send + Sync {
    /// Obtains a device id for `sender_id`.
    async fn register(&self, sender_id: &str) -> PushResult<String>;

    /// Drops the current device id.
    async fn unregister(&self) -> PushResult<()>;
}

// =============================================================================
// Back End
// =============================================================================

/// Whether the back end already knows this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationKind {
    New,
    Update { previous_device_id: String },
}

/// Application server.
#[async_trait]
pub trait BackEndApi: Send + Sync {
    /// Creates or updates the device registration and returns the back-end
    /// device id. `previous_tags` are the tags of the last registration.
    async fn register_device(
        &self,
        relay_device_id: &str,
        kind: &RegistrationKind,
        params: &RegistrationParameters,
        previous_tags: &TagSet,
    ) -> PushResult<String>;

    async fn unregister_device(&self, device_id: &str, credentials: &Credentials) -> PushResult<()>;

    /// Uploads a batch of analytics events in one request.
    async fn send_events(&self, events: &[Event], credentials: &Credentials) -> PushResult<()>;

    /// Fetches geofences changed since `timestamp` (`0` for everything).
    async fn fetch_geofences(
        &self,
        timestamp: i64,
        credentials: &Credentials,
    ) -> PushResult<GeofenceResponse>;
}
