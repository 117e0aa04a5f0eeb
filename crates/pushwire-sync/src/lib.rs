//! # pushwire-sync: Push Notification Client Engines
//!
//! This crate keeps a device registered for push notifications, delivers
//! analytics events to the application back end, and keeps the device's
//! geofences in step with the server.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Push Client Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    PushClient (Main Orchestrator)                │  │
//! │  │                                                                  │  │
//! │  │  Built once by the host, runs its work on tokio tasks            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Registration   │  │ Job Pipeline   │  │ Geofence Engine        │    │
//! │  │ Engine         │  │                │  │                        │    │
//! │  │                │  │ PrepareDatabase│  │ Delta/full resync      │    │
//! │  │ Relay token,   │  │ EnqueueEvent   │  │ Expiry + validity      │    │
//! │  │ back-end device│  │ SendEvents     │  │ Tag/trigger filtering  │    │
//! │  │ skip unchanged │  │ + TokioAlarm   │  │ of transitions         │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          │                   │                       │                  │
//! │          ▼                   ▼                       ▼                  │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Collaborator traits (Arc<dyn _>)                                │  │
//! │  │  MessagingRelay · BackEndApi (HttpBackEnd) · PreferencesStore    │  │
//! │  │  EventStorage · GeofenceStore · GeofenceRegistrar · Alarm        │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Engines
//! - [`registration`] - Relay and back-end registration, change detection
//! - [`jobs`] - Event delivery jobs and the runner
//! - [`alarm`] - Periodic delivery with backoff
//! - [`geofence`] - Geofence resync, re-registration, transitions
//! - [`client`] - `PushClient` orchestrator
//!
//! ### Plumbing
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Push error types
//! - [`http`] - reqwest back end
//! - [`prefs`] / [`store`] - Storage seams over pushwire-db
//! - [`protocol`] - Back-end JSON bodies
//! - [`transport`] - Relay and back-end traits
//! - [`telemetry`] - tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushwire_sync::{PushClient, PushConfig};
//!
//! pushwire_sync::telemetry::init_tracing();
//! let config = PushConfig::load_or_default(None);
//!
//! let client = PushClient::open(config.clone(), relay, Some(registrar)).await?;
//! client.start().await?;
//! client.register_device_async(&config.registration_parameters()?).await?;
//!
//! client.record_event(Event::push_received(receipt_id, Utc::now())).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alarm;
pub mod client;
pub mod config;
pub mod error;
pub mod geofence;
pub mod http;
pub mod jobs;
pub mod prefs;
pub mod protocol;
pub mod registration;
pub mod store;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use alarm::{AlarmScheduler, TokioAlarm};
pub use client::{PushClient, PushClientBuilder, RegistrationListener};
pub use config::{
    AnalyticsSettings, AppConfig, DeviceConfig, GeofenceSettings, MessagingConfig,
    NetworkSettings, PlatformConfig, PushConfig, StorageSettings,
};
pub use error::{PushError, PushResult};
pub use geofence::{
    Clock, GeofenceEngine, GeofenceNotification, GeofenceRegistrar, GeofenceSync, GeofenceTrigger,
    GeofenceUpdater, SystemClock,
};
pub use http::HttpBackEnd;
pub use jobs::{run_job, Job, JobContext, JobHandle, JobResult, JobRunner};
pub use prefs::PreferencesStore;
pub use protocol::GeofenceResponse;
pub use registration::RegistrationEngine;
pub use store::{EventStorage, GeofenceStore};
pub use transport::{BackEndApi, Credentials, MessagingRelay, RegistrationKind};
