//! # Map Sync Engine
//!
//! Keeps an external map renderer's drawn geometries consistent with the
//! store's visible-route set while minimizing add/remove churn: routes that
//! stay visible across a change only get a paint update, never a geometry
//! re-add. That is what makes comparison-mode toggling cheap.
//!
//! The renderer itself is opaque behind [`MapRenderer`]; until one is
//! attached every engine operation is a no-op.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::store::RouteStore;
use crate::{Bounds, Route};

/// Visible line width in pixels.
const ROUTE_WIDTH: f64 = 4.0;
/// Line width while hovered.
const HOVER_WIDTH: f64 = 7.0;
/// Width of the invisible hit region around the line.
const HIT_WIDTH: f64 = 15.0;
const ROUTE_OPACITY: f64 = 0.85;
const FIT_PADDING: f64 = 50.0;

// ============================================================================
// Renderer Contract
// ============================================================================

/// A line geometry layer handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct LineLayer {
    pub id: String,
    /// Ordered `[lon, lat]` pairs.
    pub coordinates: Vec<[f64; 2]>,
    pub color: String,
    pub width: f64,
    pub opacity: f64,
}

/// The primitives the external renderer must provide. Implemented by the
/// embedding shell over its map widget; tests use a recording mock.
pub trait MapRenderer {
    fn add_line_layer(&mut self, layer: &LineLayer);
    fn remove_layer(&mut self, layer_id: &str);
    fn set_line_color(&mut self, layer_id: &str, color: &str);
    fn set_line_width(&mut self, layer_id: &str, width: f64);
    fn fit_bounds(&mut self, bounds: &Bounds, padding: f64);
    fn show_popup(&mut self, lng: f64, lat: f64, html: &str);
    fn hide_popup(&mut self);
}

fn hit_layer_id(route_id: &str) -> String {
    format!("route-hit-{}", route_id)
}

fn vis_layer_id(route_id: &str) -> String {
    format!("route-layer-{}", route_id)
}

/// Resolve the color a route is drawn with: its own color, or the owning
/// folder's color in comparison mode (falling back to the route's own when
/// the folder or its color is absent).
fn display_color(store: &RouteStore, route: &Route, comparison_mode: bool) -> String {
    if comparison_mode {
        if let Some(color) = store.folder(&route.folder_id).and_then(|f| f.color.clone()) {
            return color;
        }
    }
    route.color.clone()
}

// ============================================================================
// Map Sync Engine
// ============================================================================

/// Drives an attached [`MapRenderer`] from store state.
pub struct MapSyncEngine {
    renderer: Option<Box<dyn MapRenderer>>,
    /// Route ids currently drawn on the renderer.
    rendered: HashSet<String>,
    on_select: Option<Box<dyn Fn(&str)>>,
}

impl Default for MapSyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MapSyncEngine {
    pub fn new() -> Self {
        Self {
            renderer: None,
            rendered: HashSet::new(),
            on_select: None,
        }
    }

    /// Register the collaborator that receives a route id when the user
    /// clicks a drawn route.
    pub fn on_route_selected(&mut self, callback: impl Fn(&str) + 'static) {
        self.on_select = Some(Box::new(callback));
    }

    /// Attach the renderer once it has finished loading. Idempotent: a
    /// second attach while one is present is a no-op.
    pub fn attach_renderer(&mut self, renderer: Box<dyn MapRenderer>) {
        if self.renderer.is_some() {
            debug!("renderer already attached; ignoring");
            return;
        }
        self.renderer = Some(renderer);
    }

    /// Detach and return the renderer (e.g. when the map view unmounts).
    /// The rendered set is forgotten with it.
    pub fn detach_renderer(&mut self) -> Option<Box<dyn MapRenderer>> {
        self.rendered.clear();
        self.renderer.take()
    }

    /// Route ids currently drawn.
    pub fn rendered_ids(&self) -> &HashSet<String> {
        &self.rendered
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Converge the renderer onto the store's visible-route set.
    ///
    /// Removals are limited to routes that disappeared, additions to routes
    /// that appeared; routes visible before and after only get their display
    /// color refreshed.
    pub fn sync(&mut self, store: &RouteStore) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let routes = store.routes();
        let comparison_mode = store.settings().is_comparison_mode;
        let target: HashMap<&str, &Route> = routes
            .iter()
            .filter(|r| r.is_visible)
            .map(|r| (r.id.as_str(), r))
            .collect();

        let stale: Vec<String> = self
            .rendered
            .iter()
            .filter(|id| !target.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            renderer.remove_layer(&vis_layer_id(&id));
            renderer.remove_layer(&hit_layer_id(&id));
            self.rendered.remove(&id);
        }

        for (id, route) in &target {
            let color = display_color(store, route, comparison_mode);
            if self.rendered.contains(*id) {
                renderer.set_line_color(&vis_layer_id(id), &color);
                continue;
            }

            let coordinates: Vec<[f64; 2]> =
                route.points.iter().map(|p| [p.lon, p.lat]).collect();
            renderer.add_line_layer(&LineLayer {
                id: hit_layer_id(id),
                coordinates: coordinates.clone(),
                color: "transparent".to_string(),
                width: HIT_WIDTH,
                opacity: 1.0,
            });
            renderer.add_line_layer(&LineLayer {
                id: vis_layer_id(id),
                coordinates,
                color,
                width: ROUTE_WIDTH,
                opacity: ROUTE_OPACITY,
            });
            self.rendered.insert((*id).to_string());
        }
    }

    /// A base-style reload discards every custom layer, so forget the
    /// rendered set and re-add everything visible.
    pub fn on_style_loaded(&mut self, store: &RouteStore) {
        self.rendered.clear();
        self.sync(store);
    }

    /// Fit the camera to the bounding box of all visible routes. No-op when
    /// no visible route has points.
    pub fn fit_visible_bounds(&mut self, store: &RouteStore) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let routes = store.routes();
        let mut bounds: Option<Bounds> = None;
        for route in routes.iter().filter(|r| r.is_visible) {
            for point in &route.points {
                match bounds {
                    Some(ref mut b) => b.extend_point(point),
                    None => bounds = Bounds::from_points(std::slice::from_ref(point)),
                }
            }
        }

        if let Some(bounds) = bounds {
            renderer.fit_bounds(&bounds, FIT_PADDING);
        }
    }

    // ========================================================================
    // Interaction
    // ========================================================================

    /// Pointer entered a route's hit region: widen the line and show the
    /// name/distance label at the pointer.
    pub fn pointer_entered(&mut self, store: &RouteStore, route_id: &str, lng: f64, lat: f64) {
        if !self.rendered.contains(route_id) {
            return;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        renderer.set_line_width(&vis_layer_id(route_id), HOVER_WIDTH);
        if let Some(route) = store.route(route_id) {
            let html = format!(
                "<strong class=\"text-sm\">{}</strong><br><span class=\"text-xs text-gray-500\">{} km</span>",
                route.name, route.stats.distance_km
            );
            renderer.show_popup(lng, lat, &html);
        }
    }

    /// Pointer left the hit region: restore the width and hide the label.
    pub fn pointer_left(&mut self, route_id: &str) {
        if !self.rendered.contains(route_id) {
            return;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        renderer.set_line_width(&vis_layer_id(route_id), ROUTE_WIDTH);
        renderer.hide_popup();
    }

    /// A drawn route was clicked: emit its id to the selection collaborator.
    pub fn route_clicked(&self, route_id: &str) {
        if let Some(callback) = &self.on_select {
            callback(route_id);
        }
    }
}

/// Subscribe a shared engine to a store so that every store change converges
/// the renderer. Registered once at startup.
pub fn wire_to_store(engine: Rc<RefCell<MapSyncEngine>>, store: &RouteStore) {
    store.subscribe(move |store, _event| {
        engine.borrow_mut().sync(store);
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::persistence::MemoryStore;
    use crate::{compute_route_stats, RoutePoint};

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Add(String),
        Remove(String),
        Color(String, String),
        Width(String, f64),
        Fit(Bounds),
        Popup(String),
        HidePopup,
    }

    #[derive(Clone)]
    struct Recorder {
        ops: Rc<RefCell<Vec<Op>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                ops: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn take(&self) -> Vec<Op> {
            self.ops.borrow_mut().drain(..).collect()
        }

        fn count(&self, matcher: impl Fn(&Op) -> bool) -> usize {
            self.ops.borrow().iter().filter(|op| matcher(op)).count()
        }
    }

    impl MapRenderer for Recorder {
        fn add_line_layer(&mut self, layer: &LineLayer) {
            self.ops.borrow_mut().push(Op::Add(layer.id.clone()));
        }
        fn remove_layer(&mut self, layer_id: &str) {
            self.ops.borrow_mut().push(Op::Remove(layer_id.to_string()));
        }
        fn set_line_color(&mut self, layer_id: &str, color: &str) {
            self.ops
                .borrow_mut()
                .push(Op::Color(layer_id.to_string(), color.to_string()));
        }
        fn set_line_width(&mut self, layer_id: &str, width: f64) {
            self.ops
                .borrow_mut()
                .push(Op::Width(layer_id.to_string(), width));
        }
        fn fit_bounds(&mut self, bounds: &Bounds, _padding: f64) {
            self.ops.borrow_mut().push(Op::Fit(*bounds));
        }
        fn show_popup(&mut self, _lng: f64, _lat: f64, html: &str) {
            self.ops.borrow_mut().push(Op::Popup(html.to_string()));
        }
        fn hide_popup(&mut self) {
            self.ops.borrow_mut().push(Op::HidePopup);
        }
    }

    fn ready_store() -> RouteStore {
        let mut store = RouteStore::new(vec![Arc::new(MemoryStore::new())]);
        store.initialize();
        store
    }

    fn sample_route(id: &str, folder_id: &str, color: &str, visible: bool) -> crate::Route {
        let points = vec![
            RoutePoint::new(22.700, 114.100, 10.0),
            RoutePoint::new(22.701, 114.101, 15.0),
        ];
        crate::Route {
            id: id.to_string(),
            name: format!("Route {}", id),
            description: String::new(),
            folder_id: folder_id.to_string(),
            stats: compute_route_stats(&points),
            points,
            color: color.to_string(),
            is_visible: visible,
        }
    }

    fn engine_with_recorder() -> (MapSyncEngine, Recorder) {
        let recorder = Recorder::new();
        let mut engine = MapSyncEngine::new();
        engine.attach_renderer(Box::new(recorder.clone()));
        (engine, recorder)
    }

    #[test]
    fn test_sync_converges_with_minimal_churn() {
        let mut store = ready_store();
        store.add_routes(vec![
            sample_route("r1", "1", "#ef4444", true),
            sample_route("r2", "1", "#f97316", true),
            sample_route("r3", "1", "#ec4899", false),
        ]);

        let (mut engine, recorder) = engine_with_recorder();

        // A = {r1, r2}
        engine.sync(&store);
        assert_eq!(recorder.count(|op| matches!(op, Op::Add(_))), 4); // 2 layers each
        assert_eq!(recorder.count(|op| matches!(op, Op::Remove(_))), 0);
        recorder.take();

        // B = {r2, r3}
        store.set_route_visibility("r1", false);
        store.set_route_visibility("r3", true);
        engine.sync(&store);

        let ops = recorder.take();
        let removes: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, Op::Remove(_)))
            .collect();
        let adds: Vec<_> = ops.iter().filter(|op| matches!(op, Op::Add(_))).collect();

        // <= |A \ B| removals and <= |B \ A| additions, two layers per route.
        assert_eq!(removes.len(), 2);
        assert!(removes.iter().all(|op| matches!(op, Op::Remove(id) if id.contains("r1"))));
        assert_eq!(adds.len(), 2);
        assert!(adds.iter().all(|op| matches!(op, Op::Add(id) if id.contains("r3"))));

        // r2 stayed: color refresh only, no geometry re-add.
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Color(id, _) if id.contains("r2"))));

        let mut expected = HashSet::new();
        expected.insert("r2".to_string());
        expected.insert("r3".to_string());
        assert_eq!(engine.rendered_ids(), &expected);
    }

    #[test]
    fn test_comparison_mode_prefers_folder_color() {
        let mut store = ready_store();
        // Seed folder "3" carries #3b82f6.
        store.add_routes(vec![sample_route("r1", "3", "#ef4444", true)]);

        let (mut engine, recorder) = engine_with_recorder();
        engine.sync(&store);
        recorder.take();

        store.update_settings(|s| s.is_comparison_mode = true);
        engine.sync(&store);
        let ops = recorder.take();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Color(_, c) if c == "#3b82f6")));

        store.update_settings(|s| s.is_comparison_mode = false);
        engine.sync(&store);
        let ops = recorder.take();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Color(_, c) if c == "#ef4444")));
    }

    #[test]
    fn test_comparison_mode_falls_back_without_folder() {
        let mut store = ready_store();
        store.add_routes(vec![sample_route("r1", "missing", "#ef4444", true)]);
        store.update_settings(|s| s.is_comparison_mode = true);

        let (mut engine, recorder) = engine_with_recorder();
        engine.sync(&store);

        // Added with the route's own color despite comparison mode.
        assert!(recorder.count(|op| matches!(op, Op::Add(_))) > 0);
        let mut store2 = ready_store();
        store2.add_routes(vec![sample_route("r1", "missing", "#ef4444", true)]);
        store2.update_settings(|s| s.is_comparison_mode = true);
        engine.sync(&store2);
        let ops = recorder.take();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Color(_, c) if c == "#ef4444")));
    }

    #[test]
    fn test_style_reload_readds_everything() {
        let mut store = ready_store();
        store.add_routes(vec![sample_route("r1", "1", "#ef4444", true)]);

        let (mut engine, recorder) = engine_with_recorder();
        engine.sync(&store);
        recorder.take();

        // Style reload wiped the renderer's layers.
        engine.on_style_loaded(&store);
        assert_eq!(recorder.count(|op| matches!(op, Op::Add(_))), 2);
    }

    #[test]
    fn test_all_operations_noop_without_renderer() {
        let mut store = ready_store();
        store.add_routes(vec![sample_route("r1", "1", "#ef4444", true)]);

        let mut engine = MapSyncEngine::new();
        engine.sync(&store);
        engine.fit_visible_bounds(&store);
        engine.pointer_entered(&store, "r1", 114.1, 22.7);
        engine.pointer_left("r1");
        engine.on_style_loaded(&store);
        assert!(engine.rendered_ids().is_empty());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let first = Recorder::new();
        let second = Recorder::new();
        let mut engine = MapSyncEngine::new();
        engine.attach_renderer(Box::new(first.clone()));
        engine.attach_renderer(Box::new(second));

        let store = ready_store();
        engine.fit_visible_bounds(&store);

        // Still the first renderer; detaching yields it back.
        assert!(engine.detach_renderer().is_some());
        assert!(engine.detach_renderer().is_none());
    }

    #[test]
    fn test_fit_bounds_covers_visible_routes_only() {
        let mut store = ready_store();
        let mut far_away = sample_route("r2", "1", "#f97316", false);
        far_away.points = vec![
            RoutePoint::new(51.5074, -0.1278, 0.0),
            RoutePoint::new(51.5080, -0.1290, 0.0),
        ];
        store.add_routes(vec![sample_route("r1", "1", "#ef4444", true), far_away]);

        let (mut engine, recorder) = engine_with_recorder();
        engine.fit_visible_bounds(&store);

        let ops = recorder.take();
        match ops.as_slice() {
            [Op::Fit(bounds)] => {
                // Hidden London route must not stretch the box.
                assert!(bounds.max_lat < 23.0);
                assert!(bounds.min_lng > 114.0);
            }
            other => panic!("expected a single fit, got {:?}", other),
        }

        store.set_route_visibility("r1", false);
        store.set_route_visibility("r2", false);
        engine.fit_visible_bounds(&store);
        assert_eq!(recorder.count(|op| matches!(op, Op::Fit(_))), 0);
    }

    #[test]
    fn test_hover_widens_and_labels() {
        let mut store = ready_store();
        store.add_routes(vec![sample_route("r1", "1", "#ef4444", true)]);

        let (mut engine, recorder) = engine_with_recorder();
        engine.sync(&store);
        recorder.take();

        engine.pointer_entered(&store, "r1", 114.1005, 22.7005);
        let ops = recorder.take();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Width(id, w) if id.contains("r1") && *w == HOVER_WIDTH)));
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Popup(html) if html.contains("Route r1") && html.contains("km"))));

        engine.pointer_left("r1");
        let ops = recorder.take();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Op::Width(_, w) if *w == ROUTE_WIDTH)));
        assert!(ops.contains(&Op::HidePopup));
    }

    #[test]
    fn test_wired_engine_tracks_store_changes() {
        let mut store = ready_store();
        store.add_routes(vec![sample_route("r1", "1", "#ef4444", true)]);

        let recorder = Recorder::new();
        let engine = Rc::new(RefCell::new(MapSyncEngine::new()));
        engine
            .borrow_mut()
            .attach_renderer(Box::new(recorder.clone()));
        wire_to_store(Rc::clone(&engine), &store);

        store.set_route_visibility("r1", false);
        assert!(engine.borrow().rendered_ids().is_empty());

        store.set_route_visibility("r1", true);
        assert!(engine.borrow().rendered_ids().contains("r1"));
    }

    #[test]
    fn test_click_emits_selection() {
        let selected = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&selected);

        let mut engine = MapSyncEngine::new();
        engine.on_route_selected(move |id| *sink.borrow_mut() = Some(id.to_string()));
        engine.route_clicked("r1");

        assert_eq!(selected.borrow().as_deref(), Some("r1"));
    }
}
