//! # Push Client
//!
//! Main entry point for hosts. Wires the registration engine, the job
//! pipeline and the geofence engine together and runs them on tokio tasks.
//!
//! ## Client Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PushClient Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         PushClient                               │  │
//! │  │                                                                  │  │
//! │  │  • Serializes register / unregister / clear behind one gate      │  │
//! │  │  • Reports registration outcomes to a RegistrationListener       │  │
//! │  │  • Queues analytics events and filters geofence transitions      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Registration   │  │ JobRunner      │  │ GeofenceEngine         │    │
//! │  │ Engine         │  │ + TokioAlarm   │  │ + GeofenceUpdater      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Relay, then    │  │ Prepare, queue │  │ Resync, re-register,   │    │
//! │  │ back end       │  │ and send events│  │ filter transitions     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let config = PushConfig::load_or_default(None);
//! let client = PushClient::open(config.clone(), relay, registrar).await?;
//! client.start().await?;
//!
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! client.register_device(config.registration_parameters()?, tx);
//! rx.await??;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pushwire_core::{Event, GeofenceDataList, GeofenceLocationMap, RegistrationParameters};
use pushwire_db::{Database, DbConfig, GeofenceFileStore};

use crate::alarm::{AlarmScheduler, TokioAlarm};
use crate::config::PushConfig;
use crate::error::{PushError, PushResult};
use crate::geofence::{
    Clock, GeofenceEngine, GeofenceNotification, GeofenceRegistrar, GeofenceSync, GeofenceTrigger,
    GeofenceUpdater, SystemClock,
};
use crate::http::HttpBackEnd;
use crate::jobs::{Job, JobContext, JobHandle, JobQueue, JobResult, JobRunner};
use crate::prefs::PreferencesStore;
use crate::registration::RegistrationEngine;
use crate::store::{EventStorage, GeofenceStore};
use crate::transport::{BackEndApi, MessagingRelay};

// =============================================================================
// Registration Listener
// =============================================================================

/// Receives the outcome of [`PushClient::register_device`].
///
/// Both methods consume the listener, so exactly one of them runs.
pub trait RegistrationListener: Send + 'static {
    fn on_registration_complete(self);

    /// `reason` is the failure's display text, e.g.
    /// `Back-end server returned HTTP status 500`.
    fn on_registration_failed(self, reason: String);
}

impl RegistrationListener for oneshot::Sender<Result<(), String>> {
    fn on_registration_complete(self) {
        if self.send(Ok(())).is_err() {
            debug!("Registration result receiver dropped");
        }
    }

    fn on_registration_failed(self, reason: String) {
        if self.send(Err(reason)).is_err() {
            debug!("Registration result receiver dropped");
        }
    }
}

/// Registrar for builds without location support. Accepts everything.
struct NoGeofenceRegistrar;

#[async_trait]
impl GeofenceRegistrar for NoGeofenceRegistrar {
    async fn register_all(
        &self,
        _locations: &GeofenceLocationMap,
        _geofences: &GeofenceDataList,
    ) -> PushResult<()> {
        Ok(())
    }

    async fn unregister_all(&self) -> PushResult<()> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Push Client
// =============================================================================

/// Orchestrates registration, event delivery and geofencing.
pub struct PushClient {
    /// Push configuration.
    config: Arc<PushConfig>,

    /// Persisted registration state.
    prefs: Arc<dyn PreferencesStore>,

    registration: Arc<RegistrationEngine>,

    geofences: Arc<GeofenceEngine>,

    /// Whether this build can monitor regions at all.
    geofencing_available: bool,

    /// Serializes registration, unregistration and clearing.
    registration_gate: Arc<AsyncMutex<()>>,

    /// Job queue handle, usable before `start`.
    jobs: JobHandle,

    alarm: Arc<dyn AlarmScheduler>,

    /// Runner inputs, taken by `start`.
    pending_runner: Mutex<Option<(JobContext, JobQueue)>>,

    /// Runner task (set after start).
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl PushClient {
    /// Opens the SQLite database and geofence file named by `config` and
    /// builds a client talking HTTP to the configured back end.
    pub async fn open(
        config: PushConfig,
        relay: Arc<dyn MessagingRelay>,
        registrar: Option<Arc<dyn GeofenceRegistrar>>,
    ) -> PushResult<Self> {
        let db = Database::new(DbConfig::new(config.database_path()?)).await?;

        let mut builder = PushClientBuilder::new(config)
            .with_database(Arc::new(db))
            .with_relay(relay);
        if let Some(registrar) = registrar {
            builder = builder.with_registrar(registrar);
        }
        builder.build()
    }

    /// Starts the job runner and runs the cold-start jobs.
    ///
    /// Interrupted sends are reset, delivered events purged, and the
    /// persisted geofences re-registered when geofencing is on. Calling
    /// `start` twice is a no-op.
    pub async fn start(&self) -> PushResult<()> {
        let Some((ctx, queue)) = lock(&self.pending_runner).take() else {
            warn!("Push client already started");
            return Ok(());
        };

        let task = tokio::spawn(JobRunner::new(ctx, queue).run());
        *lock(&self.runner) = Some(task);

        self.jobs.submit(Job::PrepareDatabase).await?;

        if self.geofencing_enabled().await? {
            match self.geofences.reregister_current_locations().await {
                Ok(count) => info!(count, "Geofences re-registered after start"),
                Err(e) => warn!(error = %e, "Failed to re-register geofences"),
            }
        }

        info!("Push client started");
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers the device in the background and reports the outcome to
    /// `listener`.
    pub fn register_device<L>(&self, params: RegistrationParameters, listener: L) -> JoinHandle<()>
    where
        L: RegistrationListener,
    {
        let engine = Arc::clone(&self.registration);
        let gate = Arc::clone(&self.registration_gate);

        tokio::spawn(async move {
            let _guard = gate.lock().await;
            match engine.register_device(&params).await {
                Ok(()) => listener.on_registration_complete(),
                Err(e) => {
                    error!(error = %e, retryable = e.is_retryable(), "Device registration failed");
                    listener.on_registration_failed(e.to_string());
                }
            }
        })
    }

    /// Registers the device and waits for the outcome.
    pub async fn register_device_async(&self, params: &RegistrationParameters) -> PushResult<()> {
        let _guard = self.registration_gate.lock().await;
        self.registration.register_device(params).await
    }

    /// Unregisters the device from the relay and the back end.
    pub async fn unregister_device(&self, params: &RegistrationParameters) -> PushResult<()> {
        let _guard = self.registration_gate.lock().await;
        self.registration.unregister_device(params).await
    }

    /// Forgets every stored registration field without network calls.
    pub async fn clear_registration(&self) -> PushResult<()> {
        let _guard = self.registration_gate.lock().await;
        self.registration.clear_registration().await
    }

    // =========================================================================
    // Analytics
    // =========================================================================

    /// Queues an analytics event for delivery.
    ///
    /// Missing device and platform ids are filled in from the stored
    /// registration. Does nothing when analytics are disabled.
    pub async fn record_event(&self, mut event: Event) -> PushResult<()> {
        if !self.config.analytics.enabled {
            debug!(event_type = %event.event_type, "Analytics disabled, dropping event");
            return Ok(());
        }

        let stored = self.prefs.load().await?;
        if event.device_uuid.is_none() {
            event.device_uuid = stored.back_end_device_id;
        }
        if event.platform_uuid.is_none() {
            event.platform_uuid = stored.platform_uuid;
        }

        self.jobs.submit(Job::EnqueueEvent(event)).await
    }

    /// Sends one batch of pending events now instead of waiting for the
    /// alarm.
    pub async fn flush_events(&self) -> PushResult<JobResult> {
        self.jobs.run(Job::SendEvents).await
    }

    // =========================================================================
    // Geofencing
    // =========================================================================

    /// Filters a platform transition and returns what the host should show.
    ///
    /// Every surfaced transition is also recorded as a
    /// `geofence_location_trigger` event.
    pub async fn handle_geofence_transition(
        &self,
        trigger: &GeofenceTrigger,
    ) -> PushResult<Vec<GeofenceNotification>> {
        let stored = self.prefs.load().await?;
        if !(self.geofencing_available && stored.geofences_enabled) {
            debug!("Geofencing disabled, ignoring transition");
            return Ok(Vec::new());
        }

        let notifications = self
            .geofences
            .handle_transition(trigger, &stored.tags)
            .await?;

        for notification in &notifications {
            let event = Event::geofence_triggered(
                notification.geofence_id,
                notification.location_id,
                Utc::now(),
            );
            if let Err(e) = self.record_event(event).await {
                warn!(geofence_id = notification.geofence_id, error = %e, "Failed to record geofence event");
            }
        }

        Ok(notifications)
    }

    /// Re-registers the persisted geofences with the platform, e.g. after
    /// a reboot. Returns how many geofences were registered.
    pub async fn reregister_geofences(&self) -> PushResult<usize> {
        if !self.geofencing_enabled().await? {
            debug!("Geofencing disabled, nothing to re-register");
            return Ok(0);
        }
        self.geofences.reregister_current_locations().await
    }

    async fn geofencing_enabled(&self) -> PushResult<bool> {
        Ok(self.geofencing_available && self.prefs.load().await?.geofences_enabled)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stops the delivery alarm and the job runner. Queued events stay in
    /// storage for the next start.
    pub async fn shutdown(&self) -> PushResult<()> {
        info!("Shutting down push client");
        self.alarm.disable();

        let runner = lock(&self.runner).take();
        if let Some(task) = runner {
            self.jobs.shutdown().await?;
            if let Err(e) = task.await {
                error!(error = %e, "Job runner task failed");
            }
        }

        info!("Push client stopped");
        Ok(())
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`PushClient`].
///
/// Storage comes either from a [`Database`] or from the individual
/// `with_*` overrides; the overrides win.
pub struct PushClientBuilder {
    config: PushConfig,
    db: Option<Arc<Database>>,
    relay: Option<Arc<dyn MessagingRelay>>,
    back_end: Option<Arc<dyn BackEndApi>>,
    registrar: Option<Arc<dyn GeofenceRegistrar>>,
    prefs: Option<Arc<dyn PreferencesStore>>,
    events: Option<Arc<dyn EventStorage>>,
    geofence_store: Option<Arc<dyn GeofenceStore>>,
    alarm: Option<Arc<dyn AlarmScheduler>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PushClientBuilder {
    pub fn new(config: PushConfig) -> Self {
        PushClientBuilder {
            config,
            db: None,
            relay: None,
            back_end: None,
            registrar: None,
            prefs: None,
            events: None,
            geofence_store: None,
            alarm: None,
            clock: None,
        }
    }

    /// Sets the database for events and preferences.
    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the messaging relay. Required.
    pub fn with_relay(mut self, relay: Arc<dyn MessagingRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Replaces the HTTP back end.
    pub fn with_back_end(mut self, back_end: Arc<dyn BackEndApi>) -> Self {
        self.back_end = Some(back_end);
        self
    }

    /// Sets the platform region monitor. Without one, geofencing is
    /// unavailable regardless of configuration.
    pub fn with_registrar(mut self, registrar: Arc<dyn GeofenceRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn with_preferences(mut self, prefs: Arc<dyn PreferencesStore>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    pub fn with_event_storage(mut self, events: Arc<dyn EventStorage>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_geofence_store(mut self, store: Arc<dyn GeofenceStore>) -> Self {
        self.geofence_store = Some(store);
        self
    }

    /// Replaces the tokio delivery alarm.
    pub fn with_alarm(mut self, alarm: Arc<dyn AlarmScheduler>) -> Self {
        self.alarm = Some(alarm);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the client. Nothing runs until [`PushClient::start`].
    pub fn build(self) -> PushResult<PushClient> {
        self.config.validate()?;

        let relay = self
            .relay
            .ok_or_else(|| PushError::InvalidConfig("Messaging relay required".into()))?;

        let prefs: Arc<dyn PreferencesStore> = match (self.prefs, &self.db) {
            (Some(prefs), _) => prefs,
            (None, Some(db)) => Arc::new(db.preferences()),
            (None, None) => {
                return Err(PushError::InvalidConfig(
                    "Database or preferences store required".into(),
                ))
            }
        };

        let events: Arc<dyn EventStorage> = match (self.events, &self.db) {
            (Some(events), _) => events,
            (None, Some(db)) => Arc::new(db.events()),
            (None, None) => {
                return Err(PushError::InvalidConfig(
                    "Database or event storage required".into(),
                ))
            }
        };

        let geofence_store: Arc<dyn GeofenceStore> = match self.geofence_store {
            Some(store) => store,
            None => Arc::new(GeofenceFileStore::new(self.config.geofence_file()?)),
        };

        let back_end: Arc<dyn BackEndApi> = match self.back_end {
            Some(back_end) => back_end,
            None => Arc::new(HttpBackEnd::from_config(&self.config)?),
        };

        let geofencing_available = self.config.geofences.enabled && self.registrar.is_some();
        let registrar = self
            .registrar
            .unwrap_or_else(|| Arc::new(NoGeofenceRegistrar));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let geofences = Arc::new(GeofenceEngine::new(geofence_store, registrar, clock));
        let updater: Arc<dyn GeofenceSync> = Arc::new(GeofenceUpdater::new(
            Arc::clone(&geofences),
            Arc::clone(&back_end),
            Arc::clone(&prefs),
        ));

        let registration = Arc::new(RegistrationEngine::new(
            Arc::clone(&prefs),
            relay,
            Arc::clone(&back_end),
            updater,
            self.config.app.clone(),
            geofencing_available,
        ));

        let (jobs, queue) = JobHandle::channel();
        let alarm: Arc<dyn AlarmScheduler> = match self.alarm {
            Some(alarm) => alarm,
            None => Arc::new(TokioAlarm::new(jobs.clone(), &self.config.analytics)),
        };

        let ctx = JobContext {
            events,
            back_end,
            alarm: Arc::clone(&alarm),
            prefs: Arc::clone(&prefs),
            batch_size: self.config.analytics.batch_size,
        };

        debug!(geofencing_available, "Push client built");

        Ok(PushClient {
            config: Arc::new(self.config),
            prefs,
            registration,
            geofences,
            geofencing_available,
            registration_gate: Arc::new(AsyncMutex::new(())),
            jobs,
            alarm,
            pending_runner: Mutex::new(Some((ctx, queue))),
            runner: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        geofence, FakeAlarm, FakeBackEnd, FakePreferences, FakeRegistrar, FakeRelay, FixedClock,
        InMemoryEventStorage, InMemoryGeofenceStore,
    };
    use pushwire_core::{EventStatus, EventType, GeofenceTransition, StoredRegistration, TriggerType};

    struct Fixture {
        prefs: Arc<FakePreferences>,
        relay: Arc<FakeRelay>,
        back_end: Arc<FakeBackEnd>,
        events: Arc<InMemoryEventStorage>,
        store: Arc<InMemoryGeofenceStore>,
        registrar: Arc<FakeRegistrar>,
    }

    impl Fixture {
        fn new(stored: StoredRegistration) -> Self {
            Fixture {
                prefs: Arc::new(FakePreferences::with(stored)),
                relay: Arc::new(FakeRelay::default()),
                back_end: Arc::new(FakeBackEnd::default()),
                events: Arc::new(InMemoryEventStorage::default()),
                store: Arc::new(InMemoryGeofenceStore::default()),
                registrar: Arc::new(FakeRegistrar::default()),
            }
        }

        fn registered() -> Self {
            Self::new(StoredRegistration {
                back_end_device_id: Some("device-1".into()),
                platform_uuid: Some("U1".into()),
                platform_secret: Some("K1".into()),
                service_url: Some("http://x".into()),
                tags: ["news".to_string()].into(),
                geofences_enabled: true,
                ..Default::default()
            })
        }

        fn builder(&self, config: PushConfig) -> PushClientBuilder {
            PushClientBuilder::new(config)
                .with_relay(self.relay.clone())
                .with_back_end(self.back_end.clone())
                .with_registrar(self.registrar.clone())
                .with_preferences(self.prefs.clone())
                .with_event_storage(self.events.clone())
                .with_geofence_store(self.store.clone())
                .with_alarm(Arc::new(FakeAlarm::default()))
                .with_clock(Arc::new(FixedClock::default()))
        }

        fn client(&self) -> PushClient {
            self.builder(PushConfig::default()).build().unwrap()
        }
    }

    fn params() -> RegistrationParameters {
        RegistrationParameters::new("S1", "U1", "K1", "http://x")
            .with_device_alias("A1")
            .with_tags(["t1".to_string()].into())
    }

    #[tokio::test]
    async fn test_listener_hears_success() {
        let f = Fixture::new(StoredRegistration::default());
        let client = f.client();

        let (tx, rx) = oneshot::channel();
        client.register_device(params(), tx).await.unwrap();

        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(f.prefs.snapshot().back_end_device_id.as_deref(), Some("device-1"));
    }

    #[tokio::test]
    async fn test_listener_hears_back_end_reason() {
        let f = Fixture::new(StoredRegistration::default());
        f.back_end.fail_registration_with(500);
        let client = f.client();

        let (tx, rx) = oneshot::channel();
        client.register_device(params(), tx).await.unwrap();

        assert_eq!(
            rx.await.unwrap(),
            Err("Back-end server returned HTTP status 500".to_string())
        );
        assert!(f.prefs.snapshot().back_end_device_id.is_none());
    }

    #[tokio::test]
    async fn test_overlapping_registrations_run_one_after_another() {
        let f = Fixture::new(StoredRegistration::default());
        let client = f.client();

        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let first = client.register_device(params(), tx1);
        let second = client.register_device(params(), tx2);
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(rx1.await.unwrap(), Ok(()));
        assert_eq!(rx2.await.unwrap(), Ok(()));
        // the second sees what the first stored and has nothing to do
        assert_eq!(f.relay.register_calls(), 1);
        assert_eq!(f.back_end.registrations().len(), 1);
    }

    #[tokio::test]
    async fn test_recorded_event_is_delivered_with_device_ids() {
        let f = Fixture::registered();
        let client = f.client();
        client.start().await.unwrap();

        client
            .record_event(Event::push_received("r-1", Utc::now()))
            .await
            .unwrap();
        assert_eq!(client.flush_events().await.unwrap(), JobResult::Success);

        let batches = f.back_end.sent_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].device_uuid.as_deref(), Some("device-1"));
        assert_eq!(batches[0][0].platform_uuid.as_deref(), Some("U1"));
        assert_eq!(f.events.statuses(), vec![EventStatus::Posted]);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_analytics_drops_events() {
        let f = Fixture::registered();
        let mut config = PushConfig::default();
        config.analytics.enabled = false;
        let client = f.builder(config).build().unwrap();
        client.start().await.unwrap();

        client
            .record_event(Event::push_received("r-1", Utc::now()))
            .await
            .unwrap();
        assert_eq!(client.flush_events().await.unwrap(), JobResult::NoEventsToSend);
        assert_eq!(f.events.len(), 0);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transition_surfaces_matching_geofence_and_records_it() {
        let f = Fixture::registered();
        f.store.seed([
            geofence(1, &["sports", "news"], TriggerType::Enter),
            geofence(2, &["sports"], TriggerType::Enter),
        ]);
        let client = f.client();
        client.start().await.unwrap();

        let trigger = GeofenceTrigger {
            transition: GeofenceTransition::Enter,
            request_ids: vec!["PUSH_1_10".into(), "PUSH_2_20".into()],
        };
        let notifications = client.handle_geofence_transition(&trigger).await.unwrap();

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].geofence_id, 1);
        assert_eq!(notifications[0].data["title"], "Geofence 1");

        assert_eq!(client.flush_events().await.unwrap(), JobResult::Success);
        let sent = &f.back_end.sent_batches()[0][0];
        assert_eq!(sent.event_type, EventType::GeofenceLocationTrigger);
        assert_eq!((sent.geofence_id, sent.location_id), (Some(1), Some(10)));

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transition_ignored_when_user_disabled_geofencing() {
        let f = Fixture::new(StoredRegistration {
            geofences_enabled: false,
            ..Default::default()
        });
        f.store.seed([geofence(1, &[], TriggerType::EnterOrExit)]);
        let client = f.client();

        let trigger = GeofenceTrigger {
            transition: GeofenceTransition::Exit,
            request_ids: vec!["PUSH_1_10".into()],
        };
        assert!(client.handle_geofence_transition(&trigger).await.unwrap().is_empty());
        assert_eq!(client.reregister_geofences().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_reregisters_persisted_geofences() {
        let f = Fixture::registered();
        f.store.seed([geofence(3, &[], TriggerType::Exit)]);
        let client = f.client();

        client.start().await.unwrap();
        client.start().await.unwrap();

        assert_eq!(f.registrar.registered(), vec!["PUSH_3_30".to_string()]);
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_builder_requires_relay_and_storage() {
        let f = Fixture::new(StoredRegistration::default());

        let err = PushClientBuilder::new(PushConfig::default())
            .with_preferences(f.prefs.clone())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PushError::InvalidConfig(_)));

        let err = PushClientBuilder::new(PushConfig::default())
            .with_relay(f.relay.clone())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("preferences store required"));
    }
}
