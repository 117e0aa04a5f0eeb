//! # Back-End Wire Format
//!
//! JSON bodies exchanged with the application back end.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Back-End REST Endpoints                            │
//! │                                                                         │
//! │  REGISTRATION                                                          │
//! │  ────────────                                                          │
//! │  POST   v1/registration       ───► RegistrationRequest (os included)   │
//! │  PUT    v1/registration/{id}  ───► RegistrationRequest (no os)         │
//! │                               ◄─── RegistrationResponse { device_uuid }│
//! │  DELETE v1/registration/{id}                                           │
//! │                                                                         │
//! │  ANALYTICS                                                             │
//! │  ─────────                                                             │
//! │  POST   v1/analytics          ───► AnalyticsRequest { events: [...] }  │
//! │                                                                         │
//! │  GEOFENCES                                                             │
//! │  ─────────                                                             │
//! │  GET    v1/geofences?timestamp=N                                       │
//! │                               ◄─── GeofenceResponse                    │
//! │                                                                         │
//! │  Every request: Authorization: Basic base64(platform_uuid:secret)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use pushwire_core::{Event, GeofenceData, GeofenceDataList, RegistrationParameters, TagSet};

/// Path of the registration collection, relative to the base server URL.
pub const REGISTRATION_PATH: &str = "v1/registration";

/// Path of the analytics endpoint.
pub const ANALYTICS_PATH: &str = "v1/analytics";

/// Path of the geofence endpoint.
pub const GEOFENCES_PATH: &str = "v1/geofences";

// =============================================================================
// Registration
// =============================================================================

/// Tag changes carried by a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagChanges {
    /// Every tag the device wants.
    pub subscribe: Vec<String>,

    /// Tags stored from the last registration that are no longer wanted.
    pub unsubscribe: Vec<String>,
}

/// Body of a registration create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_alias: Option<String>,

    pub device_manufacturer: String,

    pub device_model: String,

    /// Only sent when the device is registered for the first time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    pub os_version: String,

    /// Device id issued by the messaging relay.
    pub registration_token: String,

    pub tags: TagChanges,
}

impl RegistrationRequest {
    /// Builds the body for `params`, computing the unsubscribe list from the
    /// tags stored by the previous registration.
    pub fn new(
        relay_device_id: &str,
        params: &RegistrationParameters,
        previous_tags: &TagSet,
        device: &DeviceConfig,
        is_new: bool,
    ) -> Self {
        RegistrationRequest {
            device_alias: params.device_alias().map(str::to_string),
            device_manufacturer: device.manufacturer.clone(),
            device_model: device.model.clone(),
            os: is_new.then(|| device.os.clone()),
            os_version: device.os_version.clone(),
            registration_token: relay_device_id.to_string(),
            tags: TagChanges {
                subscribe: params.tags().iter().cloned().collect(),
                unsubscribe: previous_tags.difference(params.tags()).cloned().collect(),
            },
        }
    }
}

/// Body returned by a successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(default)]
    pub device_uuid: Option<String>,
}

// =============================================================================
// Analytics
// =============================================================================

/// Body of an analytics upload.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRequest<'a> {
    pub events: &'a [Event],
}

// =============================================================================
// Geofences
// =============================================================================

/// Body returned by the geofence endpoint.
///
/// `last_modified` becomes the timestamp of the next delta request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeofenceResponse {
    #[serde(default)]
    pub num: i64,

    #[serde(default)]
    pub last_modified: i64,

    #[serde(default)]
    pub geofences: Vec<GeofenceData>,

    #[serde(default)]
    pub deleted_geofence_ids: Vec<i64>,
}

impl GeofenceResponse {
    /// Server geofences keyed by id. Later duplicates win.
    pub fn geofence_list(&self) -> GeofenceDataList {
        self.geofences.iter().cloned().collect()
    }
}
