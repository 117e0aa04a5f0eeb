//! # Geofence File Store
//!
//! Persists the current geofence set as one JSON document.
//!
//! ## Write Path
//! ```text
//! replace_all / add_all / remove_ids
//!      │
//!      ▼
//! serialize GeofenceDataList ──► geofences.tmp ──► rename ──► geofences.json
//! ```
//!
//! The rename is atomic on the same file system, so a reader either sees the
//! previous document or the new one, never a torn write. Read-modify-write
//! operations hold an async lock so two updates in one process don't race.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use pushwire_core::{GeofenceData, GeofenceDataList};

/// JSON file holding the persisted geofence set.
#[derive(Debug)]
pub struct GeofenceFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl GeofenceFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GeofenceFileStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the whole set. A missing file is an empty set.
    pub async fn load_all(&self) -> DbResult<GeofenceDataList> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| DbError::corrupt(self.path.display().to_string(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GeofenceDataList::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<GeofenceData>> {
        Ok(self.load_all().await?.remove(id))
    }

    /// Replaces the whole set.
    pub async fn replace_all(&self, geofences: &GeofenceDataList) -> DbResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write(geofences).await
    }

    /// Adds geofences, replacing any stored entry with the same id.
    pub async fn add_all(&self, geofences: &GeofenceDataList) -> DbResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load_all().await?;
        for geofence in geofences.iter() {
            stored.insert(geofence.clone());
        }
        self.write(&stored).await
    }

    /// Removes geofences by id. Unknown ids are ignored.
    pub async fn remove_ids(&self, ids: &[i64]) -> DbResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load_all().await?;
        let before = stored.len();
        for &id in ids {
            stored.remove(id);
        }
        debug!(removed = before - stored.len(), "Geofences removed");
        self.write(&stored).await
    }

    /// Deletes the file.
    pub async fn reset(&self) -> DbResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, geofences: &GeofenceDataList) -> DbResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let encoded = serde_json::to_vec_pretty(geofences)
            .map_err(|e| DbError::corrupt(self.path.display().to_string(), e))?;

        let tmp = self.path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&tmp, &encoded).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!(error = %cleanup, "Could not remove temporary geofence file");
            }
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(count = geofences.len(), path = %self.path.display(), "Geofences saved");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pushwire_core::{GeofenceLocation, TriggerType};
    use std::collections::{BTreeMap, BTreeSet};

    fn geofence(id: i64) -> GeofenceData {
        GeofenceData {
            id,
            expiry_time: None,
            locations: vec![GeofenceLocation {
                id: id * 10,
                name: "Office".to_string(),
                latitude: 49.0,
                longitude: -123.0,
                radius: 100.0,
            }],
            data: BTreeMap::from([("message".to_string(), format!("geofence {}", id))]),
            tags: BTreeSet::new(),
            trigger_type: Some(TriggerType::Enter),
        }
    }

    fn list(ids: &[i64]) -> GeofenceDataList {
        ids.iter().copied().map(geofence).collect()
    }

    fn store() -> (tempfile::TempDir, GeofenceFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GeofenceFileStore::new(dir.path().join("geofences.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_all_round_trip() {
        let (_dir, store) = store();
        store.replace_all(&list(&[1, 2])).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, list(&[1, 2]));
        assert_eq!(store.get(2).await.unwrap(), Some(geofence(2)));
        assert!(!store.path().with_extension("tmp").exists());

        store.replace_all(&list(&[3])).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().ids().collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn test_add_all_and_remove_ids() {
        let (_dir, store) = store();
        store.replace_all(&list(&[1, 2])).await.unwrap();

        let mut updated = geofence(2);
        updated.data.insert("extra".to_string(), "x".to_string());
        let mut additions = list(&[3]);
        additions.insert(updated.clone());
        store.add_all(&additions).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(loaded.get(2), Some(&updated));

        store.remove_ids(&[1, 99]).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().ids().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_reset() {
        let (_dir, store) = store();
        store.replace_all(&list(&[1])).await.unwrap();
        store.reset().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());

        // Resetting twice is fine.
        store.reset().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let (_dir, store) = store();
        tokio::fs::write(store.path(), b"{not json").await.unwrap();
        let err = store.load_all().await.unwrap_err();
        assert!(matches!(err, DbError::Corrupt { .. }));
    }
}
