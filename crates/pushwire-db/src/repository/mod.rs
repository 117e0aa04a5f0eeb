//! # Repository Module
//!
//! Local storage behind small, typed APIs.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who Stores What                                      │
//! │                                                                         │
//! │  Job pipeline                     Registration engine                   │
//! │       │                                 │                               │
//! │       │ db.events()                     │ db.preferences()              │
//! │       ▼                                 ▼                               │
//! │  EventRepository                   PreferencesRepository                │
//! │  ├── save / read                   ├── get::<T>(key)                    │
//! │  ├── handles_with_status           ├── set::<T>(key, value)             │
//! │  ├── set_status / delete           ├── remove(key)                      │
//! │  └── count                         └── clear                            │
//! │       │                                 │                               │
//! │       ▼                                 ▼                               │
//! │  events table                      preferences table                    │
//! │                                                                         │
//! │  Geofence engine ──► GeofenceFileStore ──► geofences.json               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`EventRepository`](events::EventRepository) - Analytics event queue
//! - [`PreferencesRepository`](preferences::PreferencesRepository) - Registration key/value store
//! - [`GeofenceFileStore`](geofences::GeofenceFileStore) - Persisted geofence set

pub mod events;
pub mod geofences;
pub mod preferences;
