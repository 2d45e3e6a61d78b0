//! Snapshot persistence and versioned backups.
//!
//! The store treats persistence as an opaque gateway: `load` never raises
//! (any failure degrades to "nothing stored" and is logged at the boundary),
//! and `save` reports an outcome the store only ever logs. The in-memory
//! store is authoritative; a save racing a later load is acceptable.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{AppSettings, Folder, Route};

// ============================================================================
// Gateway Contract
// ============================================================================

/// The persistable slice of store state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSnapshot {
    pub folders: Vec<Folder>,
    pub routes: Vec<Route>,
    pub settings: Option<AppSettings>,
}

/// Result of a save attempt. Consumers log failures; they never retry and
/// never surface them to the mutation that triggered the save.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SaveOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// An opaque snapshot store (app-data file, browser storage bridge, ...).
pub trait PersistenceGateway: Send + Sync {
    /// Load the stored snapshot, or `None` when nothing usable is stored.
    /// Implementations absorb and log their own failures.
    fn load(&self) -> Option<StoreSnapshot>;

    /// Write the snapshot. Failures are reported in the outcome only.
    fn save(&self, snapshot: &StoreSnapshot) -> SaveOutcome;
}

// ============================================================================
// File Store
// ============================================================================

/// JSON snapshot file on disk.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_snapshot(&self) -> crate::Result<Option<StoreSnapshot>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::persistence(err.to_string())),
        };
        let snapshot =
            serde_json::from_str(&text).map_err(|err| Error::persistence(err.to_string()))?;
        Ok(Some(snapshot))
    }
}

impl PersistenceGateway for FileStore {
    fn load(&self) -> Option<StoreSnapshot> {
        match self.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("ignoring unreadable store file {:?}: {}", self.path, err);
                None
            }
        }
    }

    fn save(&self, snapshot: &StoreSnapshot) -> SaveOutcome {
        let json = match serde_json::to_string_pretty(snapshot) {
            Ok(json) => json,
            Err(err) => return SaveOutcome::failed(err.to_string()),
        };
        match fs::write(&self.path, json) {
            Ok(()) => SaveOutcome::ok(),
            Err(err) => SaveOutcome::failed(format!("write {:?}: {}", self.path, err)),
        }
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory gateway: the secondary-store stand-in and the test double.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<StoreSnapshot>>,
    saves: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed save calls (useful for asserting on the
    /// fire-and-forget auto-persist path).
    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl PersistenceGateway for MemoryStore {
    fn load(&self) -> Option<StoreSnapshot> {
        self.slot.lock().ok()?.clone()
    }

    fn save(&self, snapshot: &StoreSnapshot) -> SaveOutcome {
        match self.slot.lock() {
            Ok(mut slot) => {
                *slot = Some(snapshot.clone());
                self.saves.fetch_add(1, Ordering::Relaxed);
                SaveOutcome::ok()
            }
            Err(_) => SaveOutcome::failed("memory store poisoned"),
        }
    }
}

// ============================================================================
// Backup Codec
// ============================================================================

/// Current backup document version.
pub const BACKUP_VERSION: u32 = 2;

/// Versioned export/import document. `folders` and `routes` are mandatory;
/// everything else tolerates older documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Export time, epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    pub folders: Vec<Folder>,
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<AppSettings>,
}

fn default_version() -> u32 {
    BACKUP_VERSION
}

/// Build a backup document from a snapshot, stamped with the current time.
pub fn export(snapshot: &StoreSnapshot) -> BackupDocument {
    BackupDocument {
        version: BACKUP_VERSION,
        timestamp: chrono::Utc::now().timestamp_millis(),
        folders: snapshot.folders.clone(),
        routes: snapshot.routes.clone(),
        settings: snapshot.settings.clone(),
    }
}

/// Serialize a snapshot to pretty backup JSON.
pub fn export_json(snapshot: &StoreSnapshot) -> String {
    serde_json::to_string_pretty(&export(snapshot)).unwrap_or_else(|_| "{}".to_string())
}

/// Parse a backup document, failing with a validation error when the JSON is
/// malformed or the mandatory `folders`/`routes` arrays are missing.
pub fn import_json(json: &str) -> crate::Result<BackupDocument> {
    serde_json::from_str(json).map_err(|err| {
        debug!("rejected backup document: {}", err);
        Error::validation(err.to_string())
    })
}

/// Suggested file name for a backup exported at the given epoch-ms time.
pub fn backup_file_name(timestamp_ms: i64) -> String {
    format!("velo_backup_{}.json", timestamp_ms)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoutePoint;

    fn sample_snapshot() -> StoreSnapshot {
        StoreSnapshot {
            folders: vec![Folder {
                id: "1".to_string(),
                name: "To Ride".to_string(),
                is_expanded: true,
                color: Some("#ef4444".to_string()),
            }],
            routes: vec![Route {
                id: "r1".to_string(),
                name: "Loop".to_string(),
                description: "Imported from GPX".to_string(),
                folder_id: "1".to_string(),
                points: vec![
                    RoutePoint::new(22.700, 114.100, 10.0),
                    RoutePoint::new(22.701, 114.101, 15.0),
                ],
                stats: crate::compute_route_stats(&[
                    RoutePoint::new(22.700, 114.100, 10.0),
                    RoutePoint::new(22.701, 114.101, 15.0),
                ]),
                color: "#f97316".to_string(),
                is_visible: true,
            }],
            settings: Some(AppSettings::default()),
        }
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("velo_data.json"));

        assert!(store.load().is_none());

        let snapshot = sample_snapshot();
        let outcome = store.save(&snapshot);
        assert!(outcome.success, "{:?}", outcome.error);

        let loaded = store.load().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_file_store_corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("velo_data.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_file_store_unwritable_path_reports_failure() {
        let store = FileStore::new("/definitely/not/a/dir/velo_data.json");
        let outcome = store.save(&sample_snapshot());
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::new();
        assert_eq!(store.save_count(), 0);
        store.save(&sample_snapshot());
        store.save(&sample_snapshot());
        assert_eq!(store.save_count(), 2);
        assert!(store.load().is_some());
    }

    #[test]
    fn test_import_rejects_missing_routes() {
        let err = import_json(r#"{"version":2,"folders":[]}"#).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = import_json(r#"{"version":2,"routes":[]}"#).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        assert!(import_json("not json at all").is_err());
    }

    #[test]
    fn test_import_tolerates_missing_version_and_settings() {
        let doc = import_json(r#"{"folders":[],"routes":[]}"#).unwrap();
        assert_eq!(doc.version, BACKUP_VERSION);
        assert_eq!(doc.timestamp, 0);
        assert!(doc.settings.is_none());
    }

    #[test]
    fn test_export_roundtrips_through_import() {
        let snapshot = sample_snapshot();
        let json = export_json(&snapshot);
        let doc = import_json(&json).unwrap();

        assert_eq!(doc.version, BACKUP_VERSION);
        assert!(doc.timestamp > 0);
        assert_eq!(doc.folders, snapshot.folders);
        assert_eq!(doc.routes, snapshot.routes);
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(
            backup_file_name(1754500000000),
            "velo_backup_1754500000000.json"
        );
    }
}
