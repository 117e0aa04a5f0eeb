//! # Domain Types
//!
//! Registration and analytics types used throughout the push client.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────────┐   ┌──────────────────────┐                    │
//! │  │ RegistrationParameters│  │  StoredRegistration  │                    │
//! │  │  ──────────────────  │   │  ──────────────────  │                    │
//! │  │  sender_id           │   │  relay_device_id     │                    │
//! │  │  platform_uuid       │──►│  back_end_device_id  │ compared field     │
//! │  │  platform_secret     │   │  ...every parameter  │ by field before    │
//! │  │  device_alias        │   │  app_version         │ each registration  │
//! │  │  service_url, tags   │   │  geofence timestamp  │                    │
//! │  └──────────────────────┘   └──────────────────────┘                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Event       │   │   EventStatus   │   │   EventType     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  NotPosted      │   │  PushReceived   │       │
//! │  │  event_type     │   │  Posting        │   │  NotificationOp.│       │
//! │  │  time, status   │   │  Posted         │   │  Geofence...    │       │
//! │  └─────────────────┘   │  PostingError   │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::validation::{self, ValidationResult};
use crate::NEVER_UPDATED_GEOFENCES;

/// Tags a device is subscribed to. Ordered so that comparisons and wire
/// output are deterministic.
pub type TagSet = BTreeSet<String>;

// =============================================================================
// Registration Parameters
// =============================================================================

/// Everything the caller supplies when registering a device.
///
/// Immutable once constructed: the `with_*` builders consume `self`.
///
/// ## Example
/// ```rust
/// use pushwire_core::RegistrationParameters;
///
/// let params = RegistrationParameters::new("sender", "uuid", "secret", "https://push.example.com")
///     .with_geofences_enabled(true);
/// assert!(params.geofences_enabled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationParameters {
    sender_id: String,
    platform_uuid: String,
    platform_secret: String,
    device_alias: Option<String>,
    service_url: String,
    #[serde(default)]
    tags: TagSet,
    #[serde(default)]
    geofences_enabled: bool,
}

impl RegistrationParameters {
    /// Creates parameters with no alias, no tags and geofences disabled.
    pub fn new(
        sender_id: impl Into<String>,
        platform_uuid: impl Into<String>,
        platform_secret: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            platform_uuid: platform_uuid.into(),
            platform_secret: platform_secret.into(),
            device_alias: None,
            service_url: service_url.into(),
            tags: TagSet::new(),
            geofences_enabled: false,
        }
    }

    pub fn with_device_alias(mut self, alias: impl Into<String>) -> Self {
        self.device_alias = Some(alias.into());
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_geofences_enabled(mut self, enabled: bool) -> Self {
        self.geofences_enabled = enabled;
        self
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn platform_uuid(&self) -> &str {
        &self.platform_uuid
    }

    pub fn platform_secret(&self) -> &str {
        &self.platform_secret
    }

    pub fn device_alias(&self) -> Option<&str> {
        self.device_alias.as_deref()
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// The user's preference. Geofencing is only active when the host's
    /// capability flag is also on.
    pub fn geofences_enabled(&self) -> bool {
        self.geofences_enabled
    }

    /// Checks every field a registration needs before touching the network.
    pub fn validate(&self) -> ValidationResult<()> {
        validation::validate_required("sender_id", &self.sender_id)?;
        validation::validate_required("platform_uuid", &self.platform_uuid)?;
        validation::validate_required("platform_secret", &self.platform_secret)?;
        validation::validate_service_url(&self.service_url)?;
        if let Some(alias) = &self.device_alias {
            validation::validate_device_alias(alias)?;
        }
        for tag in &self.tags {
            validation::validate_tag(tag)?;
        }
        Ok(())
    }
}

// =============================================================================
// Stored Registration
// =============================================================================

/// Persisted mirror of the last successful registration.
///
/// Every field is optional because a fresh install has none of them. The
/// preferences store persists each field independently, so a registration
/// that fails halfway leaves the earlier fields in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRegistration {
    /// Token issued by the messaging relay.
    pub relay_device_id: Option<String>,

    /// Device id issued by the application back end (`device_uuid`).
    pub back_end_device_id: Option<String>,

    pub sender_id: Option<String>,
    pub platform_uuid: Option<String>,
    pub platform_secret: Option<String>,
    pub device_alias: Option<String>,

    /// Host package identifier at the time of the last back-end registration.
    pub package_name: Option<String>,

    pub service_url: Option<String>,
    pub tags: TagSet,

    /// App version that obtained the current relay id.
    pub app_version: Option<i64>,

    /// Server timestamp of the last geofence fetch, `0` if never fetched.
    pub last_geofence_update: i64,

    /// Whether the user had geofencing enabled at the last registration.
    pub geofences_enabled: bool,

    /// A geofence resync failed and must run again on the next registration.
    pub geofence_resync_pending: bool,
}

impl Default for StoredRegistration {
    fn default() -> Self {
        Self {
            relay_device_id: None,
            back_end_device_id: None,
            sender_id: None,
            platform_uuid: None,
            platform_secret: None,
            device_alias: None,
            package_name: None,
            service_url: None,
            tags: TagSet::new(),
            app_version: None,
            last_geofence_update: NEVER_UPDATED_GEOFENCES,
            geofences_enabled: false,
            geofence_resync_pending: false,
        }
    }
}

impl StoredRegistration {
    /// True if the relay must issue a new device id for these parameters.
    pub fn needs_relay_registration(&self, params: &RegistrationParameters, app_version: i64) -> bool {
        self.relay_device_id.is_none()
            || self.sender_id_changed(params)
            || self.app_version != Some(app_version)
    }

    pub fn sender_id_changed(&self, params: &RegistrationParameters) -> bool {
        self.sender_id.as_deref() != Some(params.sender_id())
    }

    /// True if any field the back end keeps differs from the parameters.
    pub fn back_end_fields_changed(&self, params: &RegistrationParameters, package_name: &str) -> bool {
        self.platform_uuid.as_deref() != Some(params.platform_uuid())
            || self.platform_secret.as_deref() != Some(params.platform_secret())
            || self.device_alias.as_deref() != params.device_alias()
            || self.service_url.as_deref() != Some(params.service_url())
            || self.package_name.as_deref() != Some(package_name)
            || self.tags_changed(params)
    }

    pub fn tags_changed(&self, params: &RegistrationParameters) -> bool {
        &self.tags != params.tags()
    }

    /// Stored tags the caller no longer wants.
    pub fn tags_to_unsubscribe(&self, params: &RegistrationParameters) -> TagSet {
        self.tags.difference(params.tags()).cloned().collect()
    }

    pub fn has_fetched_geofences(&self) -> bool {
        self.last_geofence_update != NEVER_UPDATED_GEOFENCES
    }
}

// =============================================================================
// Event Status
// =============================================================================

/// Delivery state of an analytics event.
///
/// ## State Machine
/// ```text
/// NotPosted ──► Posting ──► Posted ──► (deleted by prepare job)
///     ▲            │
///     │            ▼
///     └──── PostingError   (retried on the next send)
///
/// Posting ──► NotPosted    (only the prepare job, after a crash)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    NotPosted,
    Posting,
    Posted,
    PostingError,
}

impl Default for EventStatus {
    fn default() -> Self {
        EventStatus::NotPosted
    }
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::NotPosted => "not_posted",
            EventStatus::Posting => "posting",
            EventStatus::Posted => "posted",
            EventStatus::PostingError => "posting_error",
        }
    }

    /// Statuses picked up by the send job.
    pub const PENDING: [EventStatus; 2] = [EventStatus::NotPosted, EventStatus::PostingError];

    pub fn is_pending(&self) -> bool {
        Self::PENDING.contains(self)
    }

    /// Checks a status change against the delivery state machine.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (NotPosted, Posting)
                | (Posting, Posted)
                | (Posting, PostingError)
                | (Posting, NotPosted)
                | (PostingError, Posting)
                | (PostingError, NotPosted)
        )
    }

    pub fn transition_to(&self, next: EventStatus) -> Result<EventStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidStatusTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event Type
// =============================================================================

/// Discriminator carried on the wire as the event `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum EventType {
    #[serde(rename = "event_push_received")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "event_push_received"))]
    PushReceived,

    #[serde(rename = "event_notification_opened")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "event_notification_opened"))]
    NotificationOpened,

    #[serde(rename = "event_geofence_locations_update")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "event_geofence_locations_update"))]
    GeofenceLocationsUpdate,

    #[serde(rename = "event_geofence_location_trigger")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "event_geofence_location_trigger"))]
    GeofenceLocationTrigger,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PushReceived => "event_push_received",
            EventType::NotificationOpened => "event_notification_opened",
            EventType::GeofenceLocationsUpdate => "event_geofence_locations_update",
            EventType::GeofenceLocationTrigger => "event_geofence_location_trigger",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event_push_received" => Ok(EventType::PushReceived),
            "event_notification_opened" => Ok(EventType::NotificationOpened),
            "event_geofence_locations_update" => Ok(EventType::GeofenceLocationsUpdate),
            "event_geofence_location_trigger" => Ok(EventType::GeofenceLocationTrigger),
            other => Err(CoreError::UnknownEventType(other.to_string())),
        }
    }
}

// =============================================================================
// Event
// =============================================================================

/// An analytics event queued for delivery to the back end.
///
/// `status` is local bookkeeping and never goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (UUID v4).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// When the event happened. Sent as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,

    /// Server-assigned id of the message this event is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,

    /// Back-end device id at the time the event was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_uuid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geofence_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i64>,

    /// Correlates the event with a platform variant.
    #[serde(rename = "variant_uuid", skip_serializing_if = "Option::is_none")]
    pub platform_uuid: Option<String>,

    #[serde(skip)]
    pub status: EventStatus,
}

impl Event {
    /// Creates a new `NotPosted` event stamped with `time`.
    pub fn new(event_type: EventType, time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            time,
            receipt_id: None,
            device_uuid: None,
            geofence_id: None,
            location_id: None,
            platform_uuid: None,
            status: EventStatus::NotPosted,
        }
    }

    pub fn push_received(receipt_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            receipt_id: Some(receipt_id.into()),
            ..Self::new(EventType::PushReceived, time)
        }
    }

    pub fn notification_opened(receipt_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            receipt_id: Some(receipt_id.into()),
            ..Self::new(EventType::NotificationOpened, time)
        }
    }

    pub fn geofence_triggered(geofence_id: i64, location_id: i64, time: DateTime<Utc>) -> Self {
        Self {
            geofence_id: Some(geofence_id),
            location_id: Some(location_id),
            ..Self::new(EventType::GeofenceLocationTrigger, time)
        }
    }

    /// Fills in the device and platform identifiers known at record time.
    pub fn with_device(mut self, device_uuid: Option<String>, platform_uuid: Option<String>) -> Self {
        self.device_uuid = device_uuid;
        self.platform_uuid = platform_uuid;
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
