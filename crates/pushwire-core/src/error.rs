//! # Error Types
//!
//! Domain-specific error types for pushwire-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pushwire-core errors (this file)                                      │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  pushwire-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  pushwire-sync errors (separate crate)                                 │
//! │  └── PushError        - What registration listeners see                │
//! │                                                                         │
//! │  Flow: ValidationError → PushError → listener failure reason           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A geofence request id did not follow the `PUSH_<geofence>_<location>` layout.
    ///
    /// ## When This Occurs
    /// - The platform reported a transition for a region some other
    ///   library registered
    /// - A request id was truncated by the platform
    #[error("Invalid geofence request id: {0}")]
    InvalidRequestId(String),

    /// An event status change that cannot happen within one delivery attempt.
    #[error("Invalid event status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Unknown event type discriminator.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller-supplied parameters don't meet requirements.
/// Registration validates before any network call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., relative URL, unsupported scheme).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidRequestId("REGION_7".to_string());
        assert_eq!(err.to_string(), "Invalid geofence request id: REGION_7");

        let err = CoreError::InvalidStatusTransition {
            from: "posted".to_string(),
            to: "posting".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid event status transition from posted to posting"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sender_id".to_string(),
        };
        assert_eq!(err.to_string(), "sender_id is required");

        let err = ValidationError::InvalidFormat {
            field: "service_url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "service_url has invalid format: relative URL without a base"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "platform_uuid".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
