//! # Geofence Engine
//!
//! Keeps the persisted geofence set, the platform registrar and the server
//! in step, and turns platform transitions into host notifications.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Back end ──► GeofenceUpdater::update(timestamp)                        │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │              GeofenceEngine::process_response                           │
//! │                     │                                                   │
//! │        timestamp == 0 ───► replace_all(valid)                           │
//! │        timestamp  > 0 ───► remove_ids(deleted), add_all(valid),         │
//! │                            drop expired                                 │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │              GeofenceStore ─────► GeofenceRegistrar::register_all       │
//! │                                                                         │
//! │  Platform ──► GeofenceTrigger ──► handle_transition(subscribed tags)    │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                               Vec<GeofenceNotification> ──► host        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod engine;
mod updater;

pub use engine::{
    Clock, GeofenceEngine, GeofenceNotification, GeofenceRegistrar, GeofenceTrigger, SystemClock,
};
pub use updater::{GeofenceSync, GeofenceUpdater};
