//! # Push Error Types
//!
//! Error types for registration, event delivery and geofence sync.
//!
//! The `Display` text of a [`PushError`] is the failure reason handed to
//! registration listeners and job results, so transport variants keep the
//! exact wording hosts already match on.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Push Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌──────────────────────┐  ┌──────────────────┐   │
//! │  │  Configuration  │  │   Transport          │  │    Storage       │   │
//! │  │                 │  │                      │  │                  │   │
//! │  │  InvalidConfig  │  │  ConnectionFailed    │  │  Storage         │   │
//! │  │  InvalidUrl     │  │  Timeout             │  │                  │   │
//! │  │  Validation     │  │  BackEndStatus       │  └──────────────────┘   │
//! │  │  ConfigLoad/Save│  │  BackEndEmptyResponse│                         │
//! │  └─────────────────┘  │  MissingDeviceUuid   │  ┌──────────────────┐   │
//! │                       │  Relay(Un)Registr... │  │    Geofence      │   │
//! │                       └──────────────────────┘  │  UpdateFailed    │   │
//! │                                                 │  Registration... │   │
//! │                                                 └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pushwire_core::ValidationError;
use thiserror::Error;

/// Result type alias for push operations.
pub type PushResult<T> = Result<T, PushError>;

/// Push error type covering every failure the engines can report.
#[derive(Debug, Error)]
pub enum PushError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid push configuration.
    #[error("Invalid push configuration: {0}")]
    InvalidConfig(String),

    /// Base server URL could not be parsed.
    #[error("Invalid base server URL: {0}")]
    InvalidUrl(String),

    /// Registration parameters failed validation.
    #[error("Invalid registration parameters: {0}")]
    Validation(#[from] ValidationError),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The HTTP request never produced a response.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timeout.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// The back end answered with a non-2xx status.
    #[error("Back-end server returned HTTP status {0}")]
    BackEndStatus(u16),

    /// The back end answered 2xx with no body.
    #[error("Back-end server response empty")]
    BackEndEmptyResponse,

    /// The registration response had no usable device id.
    #[error("Back-end server did not return device_uuid")]
    MissingDeviceUuid,

    /// The messaging relay refused to issue a device id.
    #[error("{0}")]
    RelayRegistrationFailed(String),

    /// The messaging relay refused to drop the device id.
    #[error("{0}")]
    RelayUnregistrationFailed(String),

    /// Failed to serialize a request body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a response body.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Geofence Errors
    // =========================================================================
    /// Fetching or applying a geofence update failed.
    #[error("Geofence update failed: {0}")]
    GeofenceUpdateFailed(String),

    /// The platform registrar rejected the location set.
    #[error("Geofence registration failed: {0}")]
    GeofenceRegistrationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Operation requires a stored registration that doesn't exist yet.
    #[error("Device is not registered: {0}")]
    NotRegistered(String),

    /// Client is shutting down.
    #[error("Push client is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<pushwire_db::DbError> for PushError {
    fn from(err: pushwire_db::DbError) -> Self {
        PushError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PushError {
    fn from(err: serde_json::Error) -> Self {
        PushError::DeserializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for PushError {
    fn from(err: url::ParseError) -> Self {
        PushError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return PushError::ConnectionFailed(format!("request timed out: {}", err));
        }
        if let Some(status) = err.status() {
            return PushError::BackEndStatus(status.as_u16());
        }
        if err.is_decode() {
            return PushError::DeserializationFailed(err.to_string());
        }
        PushError::ConnectionFailed(err.to_string())
    }
}

impl From<std::io::Error> for PushError {
    fn from(err: std::io::Error) -> Self {
        PushError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for PushError {
    fn from(err: toml::de::Error) -> Self {
        PushError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for PushError {
    fn from(err: toml::ser::Error) -> Self {
        PushError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl PushError {
    /// Returns true if retrying the same request later could succeed.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - 5xx and 429 responses
    /// - Relay failures (the relay is usually just unreachable)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration and validation errors
    /// - 4xx responses other than 429
    pub fn is_retryable(&self) -> bool {
        match self {
            PushError::ConnectionFailed(_)
            | PushError::Timeout(_)
            | PushError::BackEndEmptyResponse
            | PushError::RelayRegistrationFailed(_)
            | PushError::RelayUnregistrationFailed(_)
            | PushError::GeofenceUpdateFailed(_) => true,
            PushError::BackEndStatus(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PushError::InvalidConfig(_)
                | PushError::InvalidUrl(_)
                | PushError::Validation(_)
                | PushError::ConfigLoadFailed(_)
                | PushError::ConfigSaveFailed(_)
        )
    }
}
