//! # VeloRoute
//!
//! Local-first manager core for cycling and hiking GPS routes.
//!
//! This library provides:
//! - A reactive route/folder store with synchronous change notification
//! - Geospatial statistics (distance, elevation, slope) for imported tracks
//! - Display-color allocation from a curated, basemap-safe palette
//! - Incremental synchronization of an external map renderer
//! - Snapshot persistence and versioned JSON backups
//!
//! ## Features
//!
//! - **`http`** - Enable the HTTP client for Mapbox access-token validation
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use veloroute::{MemoryStore, RouteStore};
//!
//! let mut store = RouteStore::new(vec![Arc::new(MemoryStore::new())]);
//! store.initialize();
//!
//! // A fresh store is seeded with three default folders.
//! assert_eq!(store.folders().len(), 3);
//!
//! let folder_id = store.add_folder("Weekend Rides");
//! assert!(store.folder(&folder_id).is_some());
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Error, Result};

// Geospatial statistics (distance, elevation gain/loss, slope)
pub mod stats;
pub use stats::compute_route_stats;

// Display-color allocation from the curated palette
pub mod colors;

// The reactive route/folder data store
pub mod store;
pub use store::{RouteStore, StoreEvent, StorePhase};

// Snapshot persistence and versioned backups
pub mod persistence;
pub use persistence::{
    BackupDocument, FileStore, MemoryStore, PersistenceGateway, SaveOutcome, StoreSnapshot,
};

// Map renderer synchronization
pub mod map_sync;
pub use map_sync::{wire_to_store, LineLayer, MapRenderer, MapSyncEngine};

// GPX batch import
pub mod import;
pub use import::{import_gpx_files, ImportSummary, TrackFile};

// HTTP client for Mapbox key validation
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{validate_key_in_background, KeyValidationHandle};

// ============================================================================
// Core Types
// ============================================================================

/// A raw GPS track sample: latitude, longitude, elevation in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters. Tracks without elevation data default to 0.
    #[serde(default)]
    pub ele: f64,
}

impl RoutePoint {
    pub fn new(lat: f64, lon: f64, ele: f64) -> Self {
        Self { lat, lon, ele }
    }
}

/// Derived statistics for a route. Always a pure function of the route's
/// points, recomputed at creation and never patched independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    /// Total distance in kilometers, rounded to 2 decimals
    pub distance_km: f64,
    /// Cumulative elevation gain in meters, rounded to the nearest integer
    pub elevation_gain_m: f64,
    /// Cumulative elevation loss in meters, rounded to the nearest integer
    pub elevation_loss_m: f64,
    /// Mean slope % over credible segments, rounded to 1 decimal
    pub avg_slope: f64,
    /// Steepest climb % over credible segments
    pub max_slope: f64,
    /// Steepest descent % over credible segments
    pub min_slope: f64,
}

/// A stored route. Owned exclusively by [`RouteStore`]; mutated only through
/// named store operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Must reference a live [`Folder`]; deleting the folder deletes the route.
    pub folder_id: String,
    /// Ordered track samples, always length >= 2.
    pub points: Vec<RoutePoint>,
    pub stats: RouteStats,
    /// Individual display color (hex), allocated at import time.
    pub color: String,
    #[serde(default)]
    pub is_visible: bool,
}

/// A route folder. Colors are backfilled lazily when a folder is observed
/// without one (used for comparison-mode display).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_expanded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Application settings. `is_comparison_mode` is transient display state and
/// is always reset to `false` at startup regardless of what was persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub mapbox_api_key: String,
    pub mapbox_key_valid: bool,
    pub dont_remind_mapbox: bool,
    pub is_comparison_mode: bool,
}

/// A longitude/latitude pair, in renderer order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

/// Transient camera state used to restore the renderer within a session.
/// Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewState {
    pub center: LngLat,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for MapViewState {
    fn default() -> Self {
        Self {
            center: LngLat {
                lng: 114.2477,
                lat: 22.7199,
            },
            zoom: 12.0,
            pitch: 0.0,
            bearing: 0.0,
        }
    }
}

/// Bounding box for one or more routes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds enclosing the given points.
    pub fn from_points(points: &[RoutePoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lng: first.lon,
            max_lng: first.lon,
        };
        for p in &points[1..] {
            bounds.extend_point(p);
        }
        Some(bounds)
    }

    /// Grow the bounds to include another point.
    pub fn extend_point(&mut self, p: &RoutePoint) {
        self.min_lat = self.min_lat.min(p.lat);
        self.max_lat = self.max_lat.max(p.lat);
        self.min_lng = self.min_lng.min(p.lon);
        self.max_lng = self.max_lng.max(p.lon);
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> LngLat {
        LngLat {
            lng: (self.min_lng + self.max_lng) / 2.0,
            lat: (self.min_lat + self.max_lat) / 2.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
