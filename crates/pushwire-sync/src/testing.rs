//! In-memory collaborators for unit tests. Every fake records the calls it
//! receives so tests can assert on what was (and wasn't) done.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::alarm::AlarmScheduler;
use crate::error::{PushError, PushResult};
use crate::geofence::{Clock, GeofenceRegistrar, GeofenceSync};
use crate::jobs::JobContext;
use crate::prefs::PreferencesStore;
use crate::protocol::GeofenceResponse;
use crate::store::{EventStorage, GeofenceStore};
use crate::transport::{BackEndApi, Credentials, MessagingRelay, RegistrationKind};
use pushwire_core::{
    Event, EventStatus, GeofenceData, GeofenceDataList, GeofenceLocation, GeofenceLocationMap,
    RegistrationParameters, StoredRegistration, TagSet, TriggerType, NEVER_UPDATED_GEOFENCES,
};
use pushwire_db::EventHandle;

// =============================================================================
// Preferences
// =============================================================================

/// A stored field, for "was X saved" assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefField {
    RelayDeviceId,
    BackEndDeviceId,
    SenderId,
    PlatformUuid,
    PlatformSecret,
    DeviceAlias,
    PackageName,
    ServiceUrl,
    Tags,
    AppVersion,
    LastGeofenceUpdate,
    GeofencesEnabled,
    GeofenceResyncPending,
    All,
}

#[derive(Default)]
pub struct FakePreferences {
    stored: Mutex<StoredRegistration>,
    saved: Mutex<Vec<PrefField>>,
}

impl FakePreferences {
    pub fn with(stored: StoredRegistration) -> Self {
        FakePreferences {
            stored: Mutex::new(stored),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> StoredRegistration {
        self.stored.lock().unwrap().clone()
    }

    pub fn saved_fields(&self) -> Vec<PrefField> {
        self.saved.lock().unwrap().clone()
    }

    pub fn was_saved(&self, field: PrefField) -> bool {
        self.saved.lock().unwrap().contains(&field)
    }

    pub fn clear_saved(&self) {
        self.saved.lock().unwrap().clear();
    }

    fn write(&self, field: PrefField, apply: impl FnOnce(&mut StoredRegistration)) -> PushResult<()> {
        apply(&mut *self.stored.lock().unwrap());
        self.saved.lock().unwrap().push(field);
        Ok(())
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

#[async_trait]
impl PreferencesStore for FakePreferences {
    async fn load(&self) -> PushResult<StoredRegistration> {
        Ok(self.snapshot())
    }

    async fn set_relay_device_id(&self, id: Option<&str>) -> PushResult<()> {
        self.write(PrefField::RelayDeviceId, |s| s.relay_device_id = owned(id))
    }

    async fn set_back_end_device_id(&self, id: Option<&str>) -> PushResult<()> {
        self.write(PrefField::BackEndDeviceId, |s| s.back_end_device_id = owned(id))
    }

    async fn set_sender_id(&self, sender_id: Option<&str>) -> PushResult<()> {
        self.write(PrefField::SenderId, |s| s.sender_id = owned(sender_id))
    }

    async fn set_platform_uuid(&self, uuid: Option<&str>) -> PushResult<()> {
        self.write(PrefField::PlatformUuid, |s| s.platform_uuid = owned(uuid))
    }

    async fn set_platform_secret(&self, secret: Option<&str>) -> PushResult<()> {
        self.write(PrefField::PlatformSecret, |s| s.platform_secret = owned(secret))
    }

    async fn set_device_alias(&self, alias: Option<&str>) -> PushResult<()> {
        self.write(PrefField::DeviceAlias, |s| s.device_alias = owned(alias))
    }

    async fn set_package_name(&self, package_name: Option<&str>) -> PushResult<()> {
        self.write(PrefField::PackageName, |s| s.package_name = owned(package_name))
    }

    async fn set_service_url(&self, url: Option<&str>) -> PushResult<()> {
        self.write(PrefField::ServiceUrl, |s| s.service_url = owned(url))
    }

    async fn set_tags(&self, tags: &TagSet) -> PushResult<()> {
        self.write(PrefField::Tags, |s| s.tags = tags.clone())
    }

    async fn set_app_version(&self, version: Option<i64>) -> PushResult<()> {
        self.write(PrefField::AppVersion, |s| s.app_version = version)
    }

    async fn set_last_geofence_update(&self, timestamp: i64) -> PushResult<()> {
        self.write(PrefField::LastGeofenceUpdate, |s| s.last_geofence_update = timestamp)
    }

    async fn set_geofences_enabled(&self, enabled: bool) -> PushResult<()> {
        self.write(PrefField::GeofencesEnabled, |s| s.geofences_enabled = enabled)
    }

    async fn set_geofence_resync_pending(&self, pending: bool) -> PushResult<()> {
        self.write(PrefField::GeofenceResyncPending, |s| {
            s.geofence_resync_pending = pending
        })
    }

    async fn clear_all(&self) -> PushResult<()> {
        self.write(PrefField::All, |s| *s = StoredRegistration::default())
    }
}

// =============================================================================
// Messaging Relay
// =============================================================================

pub struct FakeRelay {
    device_id: Mutex<String>,
    register_failure: Mutex<Option<String>>,
    unregister_failure: Mutex<Option<String>>,
    senders: Mutex<Vec<String>>,
    unregister_calls: AtomicUsize,
}

impl Default for FakeRelay {
    fn default() -> Self {
        FakeRelay {
            device_id: Mutex::new("relay-1".to_string()),
            register_failure: Mutex::new(None),
            unregister_failure: Mutex::new(None),
            senders: Mutex::new(Vec::new()),
            unregister_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeRelay {
    pub fn set_device_id(&self, id: &str) {
        *self.device_id.lock().unwrap() = id.to_string();
    }

    pub fn fail_registration_with(&self, reason: &str) {
        *self.register_failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_unregistration_with(&self, reason: &str) {
        *self.unregister_failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn register_calls(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    pub fn registered_senders(&self) -> Vec<String> {
        self.senders.lock().unwrap().clone()
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingRelay for FakeRelay {
    async fn register(&self, sender_id: &str) -> PushResult<String> {
        self.senders.lock().unwrap().push(sender_id.to_string());
        if let Some(reason) = self.register_failure.lock().unwrap().clone() {
            return Err(PushError::RelayRegistrationFailed(reason));
        }
        Ok(self.device_id.lock().unwrap().clone())
    }

    async fn unregister(&self) -> PushResult<()> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        match self.unregister_failure.lock().unwrap().clone() {
            Some(reason) => Err(PushError::RelayUnregistrationFailed(reason)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Back End
// =============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRegistration {
    pub relay_device_id: String,
    pub kind: RegistrationKind,
    pub params: RegistrationParameters,
    pub previous_tags: TagSet,
}

pub struct FakeBackEnd {
    device_id: Mutex<String>,
    register_status: Mutex<Option<u16>>,
    unregister_status: Mutex<Option<u16>>,
    send_status: Mutex<Option<u16>>,
    geofence_status: Mutex<Option<u16>>,
    geofence_response: Mutex<GeofenceResponse>,
    registrations: Mutex<Vec<RecordedRegistration>>,
    unregistrations: Mutex<Vec<String>>,
    sent: Mutex<Vec<Vec<Event>>>,
    send_attempts: AtomicUsize,
    geofence_requests: Mutex<Vec<i64>>,
}

impl Default for FakeBackEnd {
    fn default() -> Self {
        FakeBackEnd {
            device_id: Mutex::new("device-1".to_string()),
            register_status: Mutex::new(None),
            unregister_status: Mutex::new(None),
            send_status: Mutex::new(None),
            geofence_status: Mutex::new(None),
            geofence_response: Mutex::new(GeofenceResponse::default()),
            registrations: Mutex::new(Vec::new()),
            unregistrations: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            geofence_requests: Mutex::new(Vec::new()),
        }
    }
}

fn status_result(status: &Mutex<Option<u16>>) -> PushResult<()> {
    match *status.lock().unwrap() {
        Some(code) => Err(PushError::BackEndStatus(code)),
        None => Ok(()),
    }
}

impl FakeBackEnd {
    pub fn set_device_id(&self, id: &str) {
        *self.device_id.lock().unwrap() = id.to_string();
    }

    pub fn fail_registration_with(&self, status: u16) {
        *self.register_status.lock().unwrap() = Some(status);
    }

    pub fn fail_unregistration_with(&self, status: u16) {
        *self.unregister_status.lock().unwrap() = Some(status);
    }

    pub fn fail_send_with(&self, status: u16) {
        *self.send_status.lock().unwrap() = Some(status);
    }

    pub fn succeed_send(&self) {
        *self.send_status.lock().unwrap() = None;
    }

    pub fn fail_geofences_with(&self, status: u16) {
        *self.geofence_status.lock().unwrap() = Some(status);
    }

    pub fn set_geofence_response(&self, response: GeofenceResponse) {
        *self.geofence_response.lock().unwrap() = response;
    }

    pub fn registrations(&self) -> Vec<RecordedRegistration> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn unregistrations(&self) -> Vec<String> {
        self.unregistrations.lock().unwrap().clone()
    }

    /// Batches the back end accepted.
    pub fn sent_batches(&self) -> Vec<Vec<Event>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn geofence_requests(&self) -> Vec<i64> {
        self.geofence_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackEndApi for FakeBackEnd {
    async fn register_device(
        &self,
        relay_device_id: &str,
        kind: &RegistrationKind,
        params: &RegistrationParameters,
        previous_tags: &TagSet,
    ) -> PushResult<String> {
        self.registrations.lock().unwrap().push(RecordedRegistration {
            relay_device_id: relay_device_id.to_string(),
            kind: kind.clone(),
            params: params.clone(),
            previous_tags: previous_tags.clone(),
        });
        status_result(&self.register_status)?;
        Ok(self.device_id.lock().unwrap().clone())
    }

    async fn unregister_device(&self, device_id: &str, _credentials: &Credentials) -> PushResult<()> {
        self.unregistrations.lock().unwrap().push(device_id.to_string());
        status_result(&self.unregister_status)
    }

    async fn send_events(&self, events: &[Event], _credentials: &Credentials) -> PushResult<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        status_result(&self.send_status)?;
        self.sent.lock().unwrap().push(events.to_vec());
        Ok(())
    }

    async fn fetch_geofences(
        &self,
        timestamp: i64,
        _credentials: &Credentials,
    ) -> PushResult<GeofenceResponse> {
        self.geofence_requests.lock().unwrap().push(timestamp);
        status_result(&self.geofence_status)?;
        Ok(self.geofence_response.lock().unwrap().clone())
    }
}

// =============================================================================
// Geofence Sync
// =============================================================================

/// Records resync requests; a successful update stores
/// [`FakeGeofenceSync::LAST_MODIFIED`] like the real updater would.
pub struct FakeGeofenceSync {
    prefs: Arc<FakePreferences>,
    updates: Mutex<Vec<i64>>,
    clear_calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeGeofenceSync {
    pub const LAST_MODIFIED: i64 = 1_700_000_000_000;

    pub fn new(prefs: Arc<FakePreferences>) -> Self {
        FakeGeofenceSync {
            prefs,
            updates: Mutex::new(Vec::new()),
            clear_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn updates(&self) -> Vec<i64> {
        self.updates.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GeofenceSync for FakeGeofenceSync {
    async fn update(&self, _credentials: &Credentials, timestamp: i64) -> PushResult<()> {
        self.updates.lock().unwrap().push(timestamp);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PushError::GeofenceUpdateFailed("unreachable".into()));
        }
        self.prefs.set_last_geofence_update(Self::LAST_MODIFIED).await
    }

    async fn clear(&self) -> PushResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.prefs
            .set_last_geofence_update(NEVER_UPDATED_GEOFENCES)
            .await
    }
}

// =============================================================================
// Event Storage
// =============================================================================

#[derive(Default)]
pub struct InMemoryEventStorage {
    events: Mutex<BTreeMap<EventHandle, Event>>,
    fail_writes: AtomicBool,
}

impl InMemoryEventStorage {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn status_of(&self, handle: EventHandle) -> Option<EventStatus> {
        self.events.lock().unwrap().get(&handle).map(|e| e.status)
    }

    /// Statuses in handle order.
    pub fn statuses(&self) -> Vec<EventStatus> {
        self.events.lock().unwrap().values().map(|e| e.status).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn check_writable(&self) -> PushResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(PushError::Storage("disk full".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStorage {
    async fn save(&self, event: &Event) -> PushResult<EventHandle> {
        self.check_writable()?;
        let mut events = self.events.lock().unwrap();
        let handle = events.keys().next_back().map_or(1, |last| last + 1);
        events.insert(handle, event.clone());
        Ok(handle)
    }

    async fn read(&self, handle: EventHandle) -> PushResult<Option<Event>> {
        Ok(self.events.lock().unwrap().get(&handle).cloned())
    }

    async fn read_many(&self, handles: &[EventHandle]) -> PushResult<Vec<(EventHandle, Event)>> {
        let events = self.events.lock().unwrap();
        Ok(handles
            .iter()
            .filter_map(|h| events.get(h).map(|e| (*h, e.clone())))
            .collect())
    }

    async fn handles_with_status(
        &self,
        statuses: &[EventStatus],
        limit: Option<u32>,
    ) -> PushResult<Vec<EventHandle>> {
        let events = self.events.lock().unwrap();
        let matching = events
            .iter()
            .filter(|(_, e)| statuses.contains(&e.status))
            .map(|(h, _)| *h);
        Ok(match limit {
            Some(limit) => matching.take(limit as usize).collect(),
            None => matching.collect(),
        })
    }

    async fn set_status(&self, handles: &[EventHandle], status: EventStatus) -> PushResult<u64> {
        self.check_writable()?;
        let mut events = self.events.lock().unwrap();
        let mut updated = 0;
        for handle in handles {
            if let Some(event) = events.get_mut(handle) {
                event.status = status;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, handles: &[EventHandle]) -> PushResult<u64> {
        self.check_writable()?;
        let mut events = self.events.lock().unwrap();
        Ok(handles.iter().filter(|h| events.remove(h).is_some()).count() as u64)
    }

    async fn count(&self, statuses: &[EventStatus]) -> PushResult<i64> {
        let events = self.events.lock().unwrap();
        Ok(events.values().filter(|e| statuses.contains(&e.status)).count() as i64)
    }
}

// =============================================================================
// Alarm
// =============================================================================

#[derive(Default)]
pub struct FakeAlarm {
    enabled: AtomicBool,
}

impl FakeAlarm {
    pub fn is_enabled_now(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn force_enabled(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

impl AlarmScheduler for FakeAlarm {
    fn enable_if_disabled(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.is_enabled_now()
    }
}

// =============================================================================
// Geofence Store, Registrar, Clock
// =============================================================================

#[derive(Default)]
pub struct InMemoryGeofenceStore {
    geofences: Mutex<GeofenceDataList>,
}

impl InMemoryGeofenceStore {
    pub fn seed(&self, geofences: impl IntoIterator<Item = GeofenceData>) {
        let mut stored = self.geofences.lock().unwrap();
        for geofence in geofences {
            stored.insert(geofence);
        }
    }

    pub fn ids(&self) -> Vec<i64> {
        self.geofences.lock().unwrap().ids().collect()
    }
}

#[async_trait]
impl GeofenceStore for InMemoryGeofenceStore {
    async fn load_all(&self) -> PushResult<GeofenceDataList> {
        Ok(self.geofences.lock().unwrap().clone())
    }

    async fn get(&self, id: i64) -> PushResult<Option<GeofenceData>> {
        Ok(self.geofences.lock().unwrap().get(id).cloned())
    }

    async fn replace_all(&self, geofences: &GeofenceDataList) -> PushResult<()> {
        *self.geofences.lock().unwrap() = geofences.clone();
        Ok(())
    }

    async fn add_all(&self, geofences: &GeofenceDataList) -> PushResult<()> {
        self.seed(geofences.iter().cloned());
        Ok(())
    }

    async fn remove_ids(&self, ids: &[i64]) -> PushResult<()> {
        let mut stored = self.geofences.lock().unwrap();
        for id in ids {
            stored.remove(*id);
        }
        Ok(())
    }

    async fn reset(&self) -> PushResult<()> {
        *self.geofences.lock().unwrap() = GeofenceDataList::new();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistrar {
    registered: Mutex<Vec<String>>,
    unregister_calls: AtomicUsize,
    register_failure: Mutex<Option<String>>,
}

impl FakeRegistrar {
    pub fn fail_registration_with(&self, reason: &str) {
        *self.register_failure.lock().unwrap() = Some(reason.to_string());
    }

    /// Request ids of the last `register_all`, empty after `unregister_all`.
    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeofenceRegistrar for FakeRegistrar {
    async fn register_all(
        &self,
        locations: &GeofenceLocationMap,
        _geofences: &GeofenceDataList,
    ) -> PushResult<()> {
        if let Some(reason) = self.register_failure.lock().unwrap().clone() {
            return Err(PushError::GeofenceRegistrationFailed(reason));
        }
        *self.registered.lock().unwrap() = locations.request_ids().map(str::to_string).collect();
        Ok(())
    }

    async fn unregister_all(&self) -> PushResult<()> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().clear();
        Ok(())
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A valid geofence with one location (`id * 10`) and a `title` payload.
pub fn geofence(id: i64, tags: &[&str], trigger_type: TriggerType) -> GeofenceData {
    GeofenceData {
        id,
        expiry_time: None,
        locations: vec![GeofenceLocation {
            id: id * 10,
            name: format!("Location {}", id * 10),
            latitude: 52.52,
            longitude: 13.40,
            radius: 100.0,
        }],
        data: BTreeMap::from([("title".to_string(), format!("Geofence {}", id))]),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        trigger_type: Some(trigger_type),
    }
}

// =============================================================================
// Job Fixture
// =============================================================================

pub struct JobFixture {
    pub events: Arc<InMemoryEventStorage>,
    pub back_end: Arc<FakeBackEnd>,
    pub alarm: Arc<FakeAlarm>,
    pub prefs: Arc<FakePreferences>,
    pub ctx: JobContext,
}

impl JobFixture {
    /// No stored registration.
    pub fn new() -> Self {
        Self::with_prefs(FakePreferences::default())
    }

    /// Registered as device `device-1` against `http://x`.
    pub fn registered() -> Self {
        Self::with_prefs(FakePreferences::with(StoredRegistration {
            back_end_device_id: Some("device-1".into()),
            platform_uuid: Some("U1".into()),
            platform_secret: Some("K1".into()),
            service_url: Some("http://x".into()),
            ..Default::default()
        }))
    }

    fn with_prefs(prefs: FakePreferences) -> Self {
        let events = Arc::new(InMemoryEventStorage::default());
        let back_end = Arc::new(FakeBackEnd::default());
        let alarm = Arc::new(FakeAlarm::default());
        let prefs = Arc::new(prefs);
        let ctx = JobContext {
            events: events.clone(),
            back_end: back_end.clone(),
            alarm: alarm.clone(),
            prefs: prefs.clone(),
            batch_size: 100,
        };
        JobFixture {
            events,
            back_end,
            alarm,
            prefs,
            ctx,
        }
    }

    pub async fn seed_event(&self, status: EventStatus) -> EventHandle {
        let mut event = Event::push_received("receipt", Utc::now());
        event.status = status;
        self.events.save(&event).await.unwrap()
    }
}
