//! # pushwire-core: Pure Domain Types for the Push Client
//!
//! This crate holds everything the push client knows about its own state
//! without touching a disk or a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pushwire Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Host application                             │   │
//! │  │    register_device ──► record_event ──► geofence transitions    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 pushwire-sync (engines, PushClient)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ pushwire-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐ │   │
//! │  │   │    types     │  │  geofence │  │   error   │  │validation│ │   │
//! │  │   │ Registration │  │  Data     │  │ CoreError │  │  rules   │ │   │
//! │  │   │ Event        │  │  Location │  │           │  │          │ │   │
//! │  │   └──────────────┘  └───────────┘  └───────────┘  └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                pushwire-db (Persistence Layer)                  │   │
//! │  │          events table, preferences table, geofence file         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Registration parameters, stored registration, events
//! - [`geofence`] - Geofence data, request ids, tag matching, validity
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use pushwire_core::RegistrationParameters;
//!
//! let params = RegistrationParameters::new("S1", "U1", "K1", "http://x")
//!     .with_device_alias("A1")
//!     .with_tags(BTreeSet::from(["t1".to_string()]));
//!
//! assert!(params.validate().is_ok());
//! assert_eq!(params.device_alias(), Some("A1"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod geofence;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use pushwire_core::Event` instead of
// `use pushwire_core::types::Event`

pub use error::{CoreError, ValidationError};
pub use geofence::{
    GeofenceData, GeofenceDataList, GeofenceLocation, GeofenceLocationMap, GeofenceTransition,
    TriggerType,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Geofence timestamp meaning "never fetched from the server".
///
/// Passing this value to the server requests a full geofence list instead
/// of a delta.
pub const NEVER_UPDATED_GEOFENCES: i64 = 0;

/// Prefix of every platform geofence request id.
pub const GEOFENCE_REQUEST_ID_PREFIX: &str = "PUSH";

/// Smallest geofence radius the platform registrar accepts, in metres.
pub const MIN_GEOFENCE_RADIUS_METRES: f64 = 10.0;

/// Largest geofence radius the platform registrar accepts, in metres.
pub const MAX_GEOFENCE_RADIUS_METRES: f64 = 100_000.0;
