//! # pushwire-db: Local Persistence for the Push Client
//!
//! This crate provides everything the push client keeps on disk.
//! Events and preferences live in SQLite (sqlx); the geofence set lives in a
//! JSON file next to the database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pushwire Data Flow                               │
//! │                                                                         │
//! │  pushwire-sync engines                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    pushwire-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌──────────────┐ │   │
//! │  │   │   Database    │    │   Repositories   │   │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                  │   │  (embedded)  │ │   │
//! │  │   │               │    │ EventRepository  │   │              │ │   │
//! │  │   │ SqlitePool    │◄───│ PreferencesRepo  │   │ 001_init.sql │ │   │
//! │  │   │ WAL + FULL    │    │ GeofenceFileStore│   │              │ │   │
//! │  │   └───────────────┘    └──────────────────┘   └──────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pushwire.db  +  geofences.json   (in the platform data directory)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushwire_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/pushwire.db")).await?;
//! let pending = db.events().count(&EventStatus::PENDING).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::events::{EventHandle, EventRepository};
pub use repository::geofences::GeofenceFileStore;
pub use repository::preferences::{keys as preference_keys, PreferencesRepository};
