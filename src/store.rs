//! # Route Store
//!
//! The single authoritative in-memory model: folders, routes, settings and
//! transient map view state. All mutations go through named operations that
//! replace the affected collection with a new value and synchronously notify
//! registered observers, so an observer never sees a partially-updated
//! collection.
//!
//! ## Lifecycle
//!
//! The store starts `Uninitialized`; [`RouteStore::initialize`] walks the
//! configured persistence gateways in order, seeds defaults when all are
//! empty, and transitions to `Ready`. Only after `Ready` does each mutation
//! fan out to auto-persist, so the load itself never writes back.
//!
//! Observers receive `&RouteStore` and therefore cannot write back into the
//! store mid-notification; side effects that mutate (applying a key
//! validation result, for example) happen on the caller's next turn.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::colors;
use crate::persistence::{BackupDocument, PersistenceGateway, StoreSnapshot};
use crate::{AppSettings, Folder, MapViewState, Route};

// ============================================================================
// Core Types
// ============================================================================

/// Store lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Change notification delivered to observers after a completed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    FoldersChanged,
    RoutesChanged,
    SettingsChanged,
    /// Entire state replaced (initial load or backup restore).
    StateReplaced,
}

type Observer = Rc<dyn Fn(&RouteStore, &StoreEvent)>;

// ============================================================================
// Route Store
// ============================================================================

/// The authoritative route/folder state container.
///
/// A single instance is created at startup and passed by reference to every
/// consumer (map sync, import, persistence wiring); it is never a global.
pub struct RouteStore {
    folders: Arc<Vec<Folder>>,
    routes: Arc<Vec<Route>>,
    settings: AppSettings,
    map_view: Option<MapViewState>,
    phase: StorePhase,

    /// Gateways probed in order on load; all of them receive every save.
    gateways: Vec<Arc<dyn PersistenceGateway>>,

    /// Feed to the persist worker; snapshots are written in mutation order.
    persist_tx: mpsc::Sender<StoreSnapshot>,

    observers: RefCell<Vec<Observer>>,

    /// Tie-breaker so ids minted within one millisecond stay distinct.
    id_seq: u64,
}

impl RouteStore {
    /// Create an uninitialized store backed by the given gateways
    /// (primary first, then any secondary local store).
    pub fn new(gateways: Vec<Arc<dyn PersistenceGateway>>) -> Self {
        let persist_tx = spawn_persist_worker(gateways.clone());
        Self {
            folders: Arc::new(Vec::new()),
            routes: Arc::new(Vec::new()),
            settings: AppSettings::default(),
            map_view: None,
            phase: StorePhase::Uninitialized,
            gateways,
            persist_tx,
            observers: RefCell::new(Vec::new()),
            id_seq: 0,
        }
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Run the startup protocol: load the first non-empty gateway snapshot,
    /// fall back to seeded defaults, backfill folder colors, force comparison
    /// mode off and transition to `Ready`.
    ///
    /// Returns the loaded Mapbox key, if any, so the caller can re-validate
    /// it in the background; validation never blocks readiness.
    pub fn initialize(&mut self) -> Option<String> {
        if self.phase != StorePhase::Uninitialized {
            debug!("initialize called twice; ignoring");
            return None;
        }
        self.phase = StorePhase::Loading;

        let mut loaded = None;
        for gateway in &self.gateways {
            if let Some(snapshot) = gateway.load() {
                loaded = Some(snapshot);
                break;
            }
        }

        match loaded {
            Some(snapshot) => {
                info!(
                    "loaded {} folders / {} routes from storage",
                    snapshot.folders.len(),
                    snapshot.routes.len()
                );
                self.folders = Arc::new(colors::ensure_folder_colors(snapshot.folders));
                self.routes = Arc::new(snapshot.routes);
                if let Some(settings) = snapshot.settings {
                    self.settings = settings;
                }
            }
            None => {
                info!("no stored data found, seeding default folders");
                self.folders = Arc::new(default_folders());
            }
        }

        // Comparison mode is per-session display state.
        self.settings.is_comparison_mode = false;

        self.phase = StorePhase::Ready;
        self.notify(&[StoreEvent::StateReplaced]);

        if self.settings.mapbox_api_key.is_empty() {
            None
        } else {
            Some(self.settings.mapbox_api_key.clone())
        }
    }

    pub fn phase(&self) -> StorePhase {
        self.phase
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Register an observer. Observers run synchronously, after the mutation
    /// that triggered them has fully completed.
    pub fn subscribe(&self, observer: impl Fn(&RouteStore, &StoreEvent) + 'static) {
        self.observers.borrow_mut().push(Rc::new(observer));
    }

    fn notify(&self, events: &[StoreEvent]) {
        let observers: Vec<Observer> = self.observers.borrow().clone();
        for event in events {
            for observer in &observers {
                observer(self, event);
            }
        }
    }

    /// Notify observers, then fire auto-persist once for the mutation.
    fn after_mutation(&self, events: &[StoreEvent]) {
        self.notify(events);
        self.auto_persist();
    }

    fn auto_persist(&self) {
        if self.phase != StorePhase::Ready {
            return;
        }
        // Fire-and-forget: the in-memory store stays authoritative, so a
        // failed write is only worth a log line on the worker. A dead worker
        // means the process is tearing down anyway.
        let _ = self.persist_tx.send(self.snapshot());
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn folders(&self) -> Arc<Vec<Folder>> {
        Arc::clone(&self.folders)
    }

    pub fn routes(&self) -> Arc<Vec<Route>> {
        Arc::clone(&self.routes)
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.id == id)
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn routes_in_folder(&self, folder_id: &str) -> Vec<Route> {
        self.routes
            .iter()
            .filter(|r| r.folder_id == folder_id)
            .cloned()
            .collect()
    }

    /// True when the folder has routes and every one of them is visible.
    pub fn is_folder_fully_visible(&self, folder_id: &str) -> bool {
        let mut any = false;
        for route in self.routes.iter().filter(|r| r.folder_id == folder_id) {
            if !route.is_visible {
                return false;
            }
            any = true;
        }
        any
    }

    /// Snapshot of the persistable state.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            folders: self.folders.as_ref().clone(),
            routes: self.routes.as_ref().clone(),
            settings: Some(self.settings.clone()),
        }
    }

    // ========================================================================
    // Folder Operations
    // ========================================================================

    /// Create a folder with a freshly allocated color. Returns its id.
    pub fn add_folder(&mut self, name: &str) -> String {
        let id = self.next_id("folder");
        let folder = Folder {
            id: id.clone(),
            name: name.to_string(),
            is_expanded: true,
            color: Some(colors::random_color().to_string()),
        };
        let mut next = self.folders.as_ref().clone();
        next.push(folder);
        self.folders = Arc::new(next);
        self.after_mutation(&[StoreEvent::FoldersChanged]);
        id
    }

    pub fn rename_folder(&mut self, id: &str, name: &str) {
        self.folders = Arc::new(
            self.folders
                .iter()
                .map(|f| {
                    if f.id == id {
                        Folder {
                            name: name.to_string(),
                            ..f.clone()
                        }
                    } else {
                        f.clone()
                    }
                })
                .collect(),
        );
        self.after_mutation(&[StoreEvent::FoldersChanged]);
    }

    /// Delete a folder and every route inside it in one observable
    /// transition: by the time observers run, both collections are final.
    pub fn delete_folder(&mut self, id: &str) {
        self.folders = Arc::new(self.folders.iter().filter(|f| f.id != id).cloned().collect());
        self.routes = Arc::new(
            self.routes
                .iter()
                .filter(|r| r.folder_id != id)
                .cloned()
                .collect(),
        );
        self.after_mutation(&[StoreEvent::FoldersChanged, StoreEvent::RoutesChanged]);
    }

    pub fn toggle_folder_expansion(&mut self, id: &str) {
        self.folders = Arc::new(
            self.folders
                .iter()
                .map(|f| {
                    if f.id == id {
                        Folder {
                            is_expanded: !f.is_expanded,
                            ..f.clone()
                        }
                    } else {
                        f.clone()
                    }
                })
                .collect(),
        );
        self.after_mutation(&[StoreEvent::FoldersChanged]);
    }

    // ========================================================================
    // Route Operations
    // ========================================================================

    /// Replace the route with the same id wholesale (rename, move between
    /// folders, edit description).
    pub fn update_route(&mut self, updated: Route) {
        self.routes = Arc::new(
            self.routes
                .iter()
                .map(|r| if r.id == updated.id { updated.clone() } else { r.clone() })
                .collect(),
        );
        self.after_mutation(&[StoreEvent::RoutesChanged]);
    }

    pub fn delete_route(&mut self, id: &str) {
        self.routes = Arc::new(self.routes.iter().filter(|r| r.id != id).cloned().collect());
        self.after_mutation(&[StoreEvent::RoutesChanged]);
    }

    pub fn set_route_visibility(&mut self, id: &str, is_visible: bool) {
        self.routes = Arc::new(
            self.routes
                .iter()
                .map(|r| {
                    if r.id == id {
                        Route {
                            is_visible,
                            ..r.clone()
                        }
                    } else {
                        r.clone()
                    }
                })
                .collect(),
        );
        self.after_mutation(&[StoreEvent::RoutesChanged]);
    }

    /// Show or hide every route in a folder at once.
    pub fn set_folder_visibility(&mut self, folder_id: &str, is_visible: bool) {
        self.routes = Arc::new(
            self.routes
                .iter()
                .map(|r| {
                    if r.folder_id == folder_id {
                        Route {
                            is_visible,
                            ..r.clone()
                        }
                    } else {
                        r.clone()
                    }
                })
                .collect(),
        );
        self.after_mutation(&[StoreEvent::RoutesChanged]);
    }

    /// Append a batch of new routes in a single transition (used by import,
    /// which notifies once per batch rather than once per file).
    pub fn add_routes(&mut self, new_routes: Vec<Route>) {
        if new_routes.is_empty() {
            return;
        }
        let mut next = self.routes.as_ref().clone();
        next.extend(new_routes);
        self.routes = Arc::new(next);
        self.after_mutation(&[StoreEvent::RoutesChanged]);
    }

    // ========================================================================
    // Settings & View State
    // ========================================================================

    /// Patch the settings. The patch closure sees a copy; observers only see
    /// the fully patched value.
    pub fn update_settings(&mut self, patch: impl FnOnce(&mut AppSettings)) {
        let mut next = self.settings.clone();
        patch(&mut next);
        self.settings = next;
        self.after_mutation(&[StoreEvent::SettingsChanged]);
    }

    /// Remember the renderer camera for this session. Transient: not
    /// persisted and not observable.
    pub fn set_map_view(&mut self, view: MapViewState) {
        self.map_view = Some(view);
    }

    pub fn map_view(&self) -> Option<&MapViewState> {
        self.map_view.as_ref()
    }

    // ========================================================================
    // Backup Restore
    // ========================================================================

    /// Replace the entire store state from a validated backup document.
    /// Folder colors are backfilled; settings merge in when present.
    pub fn restore(&mut self, document: BackupDocument) {
        self.folders = Arc::new(colors::ensure_folder_colors(document.folders));
        self.routes = Arc::new(document.routes);
        if let Some(settings) = document.settings {
            self.settings = settings;
        }
        self.after_mutation(&[StoreEvent::StateReplaced]);
    }

    /// Parse and apply a backup JSON document. On any validation failure the
    /// store is left byte-for-byte unchanged and the error is returned for
    /// the caller to surface.
    pub fn restore_from_json(&mut self, json: &str) -> crate::Result<()> {
        let document = crate::persistence::import_json(json)?;
        self.restore(document);
        Ok(())
    }

    // ========================================================================
    // Internal
    // ========================================================================

    pub(crate) fn next_id(&mut self, prefix: &str) -> String {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        self.id_seq += 1;
        format!("{}_{}_{:04}", prefix, ts, self.id_seq % 10_000)
    }
}

/// Start the background writer that drains auto-persist snapshots in
/// mutation order. Exits once the owning store is dropped.
fn spawn_persist_worker(gateways: Vec<Arc<dyn PersistenceGateway>>) -> mpsc::Sender<StoreSnapshot> {
    let (sender, receiver) = mpsc::channel::<StoreSnapshot>();
    thread::spawn(move || {
        while let Ok(snapshot) = receiver.recv() {
            for gateway in &gateways {
                let outcome = gateway.save(&snapshot);
                if !outcome.success {
                    warn!(
                        "auto-save failed: {}",
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    });
    sender
}

/// Seed folders for a first run.
fn default_folders() -> Vec<Folder> {
    vec![
        Folder {
            id: "1".to_string(),
            name: "To Ride".to_string(),
            is_expanded: true,
            color: Some("#ef4444".to_string()),
        },
        Folder {
            id: "2".to_string(),
            name: "Completed".to_string(),
            is_expanded: true,
            color: Some("#8b5cf6".to_string()),
        },
        Folder {
            id: "3".to_string(),
            name: "Hiking Plans".to_string(),
            is_expanded: true,
            color: Some("#3b82f6".to_string()),
        },
    ]
}

// ============================================================================
// Tests
// ============================================================================
