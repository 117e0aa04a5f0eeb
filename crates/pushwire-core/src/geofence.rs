//! # Geofence Types
//!
//! Server-defined regions, the platform request ids derived from them, and
//! the pure rules that decide which geofences are kept and which transitions
//! reach the host.
//!
//! ## Two Shapes of the Same Data
//! ```text
//! GeofenceDataList (unit of persistence)          GeofenceLocationMap (unit of registrar sync)
//! ┌───────────────────────────────────┐           ┌──────────────────────────────────────┐
//! │ 7 → GeofenceData                  │           │ "PUSH_7_70" → GeofenceLocation 70    │
//! │      locations: [70, 71]          │  ──────►  │ "PUSH_7_71" → GeofenceLocation 71    │
//! │      tags, data, trigger_type     │           │ "PUSH_9_90" → GeofenceLocation 90    │
//! │ 9 → GeofenceData                  │           └──────────────────────────────────────┘
//! │      locations: [90]              │
//! └───────────────────────────────────┘
//! ```
//!
//! A transition reported by the platform carries request ids. The geofence id
//! parsed out of the request id is the key back into the data list.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::{GEOFENCE_REQUEST_ID_PREFIX, MAX_GEOFENCE_RADIUS_METRES, MIN_GEOFENCE_RADIUS_METRES};

// =============================================================================
// Trigger Types
// =============================================================================

/// Which transitions a geofence wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Enter,
    Exit,
    EnterOrExit,
}

impl TriggerType {
    pub fn accepts(&self, transition: GeofenceTransition) -> bool {
        matches!(
            (self, transition),
            (TriggerType::EnterOrExit, _)
                | (TriggerType::Enter, GeofenceTransition::Enter)
                | (TriggerType::Exit, GeofenceTransition::Exit)
        )
    }
}

/// A transition the platform reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceTransition {
    Enter,
    Exit,
}

// =============================================================================
// Geofence Data
// =============================================================================

/// One circular region inside a geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceLocation {
    pub id: i64,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "lat")]
    pub latitude: f64,

    #[serde(rename = "long")]
    pub longitude: f64,

    /// Radius in metres.
    #[serde(rename = "rad")]
    pub radius: f64,
}

impl GeofenceLocation {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && (MIN_GEOFENCE_RADIUS_METRES..=MAX_GEOFENCE_RADIUS_METRES).contains(&self.radius)
    }
}

/// A server-defined geofence with its locations, tag filter and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceData {
    pub id: i64,

    /// After this instant the geofence is dropped. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub locations: Vec<GeofenceLocation>,

    /// Opaque payload handed to the host when the geofence triggers.
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    /// Empty means "every device".
    #[serde(default)]
    pub tags: BTreeSet<String>,

    pub trigger_type: Option<TriggerType>,
}

impl GeofenceData {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time.map_or(false, |expiry| expiry <= now)
    }

    /// Whether this geofence can be handed to the platform registrar.
    ///
    /// ## Rules
    /// - At least one location, every location in range
    /// - Non-empty payload
    /// - A trigger type
    /// - Not expired at `now`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.locations.is_empty()
            && self.locations.iter().all(GeofenceLocation::is_valid)
            && !self.data.is_empty()
            && self.trigger_type.is_some()
            && !self.is_expired(now)
    }

    /// Tag filter: a geofence with no tags is global, otherwise it must share
    /// at least one tag with the subscribed set.
    pub fn is_subscribed_to_tag(&self, subscribed: &BTreeSet<String>) -> bool {
        is_subscribed_to_tag(&self.tags, subscribed)
    }

    pub fn location(&self, location_id: i64) -> Option<&GeofenceLocation> {
        self.locations.iter().find(|l| l.id == location_id)
    }
}

/// See [`GeofenceData::is_subscribed_to_tag`].
pub fn is_subscribed_to_tag(geofence_tags: &BTreeSet<String>, subscribed: &BTreeSet<String>) -> bool {
    if geofence_tags.is_empty() {
        return true;
    }
    if subscribed.is_empty() {
        return false;
    }
    !geofence_tags.is_disjoint(subscribed)
}

// =============================================================================
// Request Ids
// =============================================================================

/// Builds the platform request id for a location of a geofence.
pub fn request_id(geofence_id: i64, location_id: i64) -> String {
    format!("{}_{}_{}", GEOFENCE_REQUEST_ID_PREFIX, geofence_id, location_id)
}

/// Splits a request id back into `(geofence id, location id)`.
///
/// ## Example
/// ```rust
/// use pushwire_core::geofence::parse_request_id;
///
/// assert_eq!(parse_request_id("PUSH_7_70").ok(), Some((7, 70)));
/// assert!(parse_request_id("OTHER_7_70").is_err());
/// ```
pub fn parse_request_id(request_id: &str) -> CoreResult<(i64, i64)> {
    let invalid = || CoreError::InvalidRequestId(request_id.to_string());

    let mut parts = request_id.splitn(3, '_');
    if parts.next() != Some(GEOFENCE_REQUEST_ID_PREFIX) {
        return Err(invalid());
    }
    let geofence_id = parts
        .next()
        .and_then(|p| p.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    let location_id = parts
        .next()
        .and_then(|p| p.parse::<i64>().ok())
        .ok_or_else(invalid)?;

    Ok((geofence_id, location_id))
}

// =============================================================================
// Collections
// =============================================================================

/// Geofences keyed by id. This is what gets persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceDataList(BTreeMap<i64, GeofenceData>);

impl GeofenceDataList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<&GeofenceData> {
        self.0.get(&id)
    }

    /// Adds or replaces by id.
    pub fn insert(&mut self, geofence: GeofenceData) {
        self.0.insert(geofence.id, geofence);
    }

    pub fn remove(&mut self, id: i64) -> Option<GeofenceData> {
        self.0.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeofenceData> {
        self.0.values()
    }

    /// Keeps only geofences that are valid at `now`. Returns how many were dropped.
    pub fn retain_valid(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.0.len();
        self.0.retain(|_, g| g.is_valid(now));
        before - self.0.len()
    }

    pub fn location_map(&self) -> GeofenceLocationMap {
        GeofenceLocationMap::from(self)
    }
}

impl FromIterator<GeofenceData> for GeofenceDataList {
    fn from_iter<I: IntoIterator<Item = GeofenceData>>(iter: I) -> Self {
        let mut list = Self::new();
        for geofence in iter {
            list.insert(geofence);
        }
        list
    }
}

impl IntoIterator for GeofenceDataList {
    type Item = GeofenceData;
    type IntoIter = std::collections::btree_map::IntoValues<i64, GeofenceData>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

/// Locations keyed by platform request id. This is what gets registered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeofenceLocationMap(BTreeMap<String, GeofenceLocation>);

impl GeofenceLocationMap {
    pub fn get(&self, request_id: &str) -> Option<&GeofenceLocation> {
        self.0.get(request_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn request_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GeofenceLocation)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<&GeofenceDataList> for GeofenceLocationMap {
    fn from(list: &GeofenceDataList) -> Self {
        let map = list
            .iter()
            .flat_map(|geofence| {
                geofence
                    .locations
                    .iter()
                    .map(move |location| (request_id(geofence.id, location.id), location.clone()))
            })
            .collect();
        GeofenceLocationMap(map)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn location(id: i64) -> GeofenceLocation {
        GeofenceLocation {
            id,
            name: format!("location {}", id),
            latitude: 49.28,
            longitude: -123.12,
            radius: 150.0,
        }
    }

    fn geofence(id: i64, location_ids: &[i64]) -> GeofenceData {
        GeofenceData {
            id,
            expiry_time: None,
            locations: location_ids.iter().copied().map(location).collect(),
            data: BTreeMap::from([("message".to_string(), "hello".to_string())]),
            tags: BTreeSet::new(),
            trigger_type: Some(TriggerType::Enter),
        }
    }

    #[test]
    fn test_tag_filter() {
        let mut sports = geofence(1, &[10]);
        sports.tags = tags(&["sports"]);

        assert!(!sports.is_subscribed_to_tag(&tags(&["news"])));
        assert!(sports.is_subscribed_to_tag(&tags(&["sports", "news"])));
        assert!(!sports.is_subscribed_to_tag(&BTreeSet::new()));

        let global = geofence(2, &[20]);
        assert!(global.is_subscribed_to_tag(&BTreeSet::new()));
        assert!(global.is_subscribed_to_tag(&tags(&["news"])));
    }

    #[test]
    fn test_trigger_type_accepts() {
        assert!(TriggerType::Enter.accepts(GeofenceTransition::Enter));
        assert!(!TriggerType::Enter.accepts(GeofenceTransition::Exit));
        assert!(TriggerType::Exit.accepts(GeofenceTransition::Exit));
        assert!(TriggerType::EnterOrExit.accepts(GeofenceTransition::Enter));
        assert!(TriggerType::EnterOrExit.accepts(GeofenceTransition::Exit));
    }

    #[test]
    fn test_request_id_round_trip() {
        assert_eq!(request_id(7, 70), "PUSH_7_70");
        assert_eq!(parse_request_id("PUSH_7_70").unwrap(), (7, 70));
    }

    #[test]
    fn test_parse_request_id_rejects_foreign_ids() {
        assert!(parse_request_id("").is_err());
        assert!(parse_request_id("PUSH").is_err());
        assert!(parse_request_id("PUSH_7").is_err());
        assert!(parse_request_id("PUSH_x_70").is_err());
        assert!(parse_request_id("OTHER_7_70").is_err());
        assert!(parse_request_id("PUSH_7_70_1").is_err());
    }

    #[test]
    fn test_validity_rules() {
        let now = Utc::now();
        assert!(geofence(1, &[10]).is_valid(now));

        assert!(!geofence(1, &[]).is_valid(now));

        let mut no_payload = geofence(1, &[10]);
        no_payload.data.clear();
        assert!(!no_payload.is_valid(now));

        let mut no_trigger = geofence(1, &[10]);
        no_trigger.trigger_type = None;
        assert!(!no_trigger.is_valid(now));

        let mut tiny = geofence(1, &[10]);
        tiny.locations[0].radius = 5.0;
        assert!(!tiny.is_valid(now));

        let mut off_planet = geofence(1, &[10]);
        off_planet.locations[0].latitude = 91.0;
        assert!(!off_planet.is_valid(now));

        let mut expired = geofence(1, &[10]);
        expired.expiry_time = Some(now - Duration::minutes(1));
        assert!(expired.is_expired(now));
        assert!(!expired.is_valid(now));
    }

    #[test]
    fn test_retain_valid_drops_invalid() {
        let now = Utc::now();
        let mut expired = geofence(3, &[30]);
        expired.expiry_time = Some(now - Duration::seconds(1));

        let mut list: GeofenceDataList = vec![geofence(1, &[10]), geofence(2, &[]), expired]
            .into_iter()
            .collect();

        assert_eq!(list.retain_valid(now), 2);
        assert_eq!(list.ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_location_map_keys() {
        let list: GeofenceDataList = vec![geofence(7, &[70, 71]), geofence(9, &[90])]
            .into_iter()
            .collect();
        let map = list.location_map();

        assert_eq!(map.len(), 3);
        assert_eq!(
            map.request_ids().collect::<Vec<_>>(),
            vec!["PUSH_7_70", "PUSH_7_71", "PUSH_9_90"]
        );
        assert_eq!(map.get("PUSH_9_90").map(|l| l.id), Some(90));
    }

    #[test]
    fn test_geofence_json_format() {
        let json = r#"{
            "id": 5,
            "expiry_time": "2099-01-01T00:00:00Z",
            "locations": [{"id": 50, "name": "Office", "lat": 49.0, "long": -123.0, "rad": 120}],
            "data": {"message": "welcome"},
            "tags": ["sports"],
            "trigger_type": "enter_or_exit"
        }"#;
        let parsed: GeofenceData = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, 5);
        assert_eq!(parsed.trigger_type, Some(TriggerType::EnterOrExit));
        assert_eq!(parsed.locations[0].radius, 120.0);
        assert!(parsed.is_valid(Utc::now()));
    }
}
