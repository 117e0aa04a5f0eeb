//! # Validation Module
//!
//! Input validation for registration parameters.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: RegistrationParameters::validate (THIS MODULE)               │
//! │  ├── Required identifiers present                                      │
//! │  └── Base server URL is absolute http(s)                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Registration engine                                          │
//! │  └── Fails before any relay or back-end call                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Back end                                                     │
//! │  └── Rejects unknown platform credentials (HTTP 401/403)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pushwire_core::validation::{validate_required, validate_service_url};
//!
//! assert!(validate_required("sender_id", "123456").is_ok());
//! assert!(validate_service_url("https://push.example.com").is_ok());
//! assert!(validate_service_url("push.example.com").is_err());
//! ```

use url::Url;

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest device alias the back end stores.
pub const MAX_DEVICE_ALIAS_LEN: usize = 255;

/// Longest tag the back end stores.
pub const MAX_TAG_LEN: usize = 255;

// =============================================================================
// String Validators
// =============================================================================

/// Rejects an empty or whitespace-only value.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a device alias.
///
/// ## Rules
/// - May be empty (the back end stores an empty alias)
/// - At most 255 characters
pub fn validate_device_alias(alias: &str) -> ValidationResult<()> {
    if alias.chars().count() > MAX_DEVICE_ALIAS_LEN {
        return Err(ValidationError::TooLong {
            field: "device_alias".to_string(),
            max: MAX_DEVICE_ALIAS_LEN,
        });
    }
    Ok(())
}

/// Validates a single subscription tag.
pub fn validate_tag(tag: &str) -> ValidationResult<()> {
    validate_required("tag", tag)?;
    if tag.chars().count() > MAX_TAG_LEN {
        return Err(ValidationError::TooLong {
            field: "tag".to_string(),
            max: MAX_TAG_LEN,
        });
    }
    Ok(())
}

// =============================================================================
// URL Validators
// =============================================================================

/// Parses and validates the base server URL.
///
/// ## Rules
/// - Must not be empty
/// - Must be an absolute URL
/// - Scheme must be `http` or `https`
///
/// ## Returns
/// The parsed URL, so callers don't parse twice.
pub fn parse_service_url(raw: &str) -> ValidationResult<Url> {
    validate_required("service_url", raw)?;

    let url = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidFormat {
        field: "service_url".to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::InvalidFormat {
                field: "service_url".to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidFormat {
            field: "service_url".to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

/// Validates the base server URL without keeping the parsed value.
pub fn validate_service_url(raw: &str) -> ValidationResult<()> {
    parse_service_url(raw).map(|_| ())
}

// =============================================================================
// Unit Tests
// =============================================================================
