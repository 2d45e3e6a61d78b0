//! GPX batch import.
//!
//! Files in a batch are processed sequentially: a malformed file (or one
//! with fewer than two track points) is skipped and the batch continues.
//! Color allocation is also sequential, so later files in a batch see the
//! colors handed to earlier ones and the batch stays distinct while the
//! palette lasts. All successfully parsed routes land in the store as a
//! single transition.

use log::{debug, warn};

use crate::store::RouteStore;
use crate::{colors, compute_route_stats, Error, Route, RoutePoint};

/// A track file handed in by the embedding shell's file picker.
#[derive(Debug, Clone)]
pub struct TrackFile {
    /// File name, used (minus the `.gpx` suffix) as the route name.
    pub name: String,
    pub contents: String,
}

/// Outcome of a batch import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Import a batch of GPX files into the given folder.
pub fn import_gpx_files(
    store: &mut RouteStore,
    files: &[TrackFile],
    folder_id: &str,
) -> ImportSummary {
    let existing = store.routes();
    let mut colors_in_use: Vec<String> = existing.iter().map(|r| r.color.clone()).collect();

    let mut new_routes = Vec::new();
    let mut skipped = 0;

    for file in files {
        let points = match parse_track_points(&file.contents) {
            Ok(points) => points,
            Err(err) => {
                warn!("skipping '{}': {}", file.name, err);
                skipped += 1;
                continue;
            }
        };
        if points.len() < 2 {
            debug!("skipping '{}': fewer than 2 track points", file.name);
            skipped += 1;
            continue;
        }

        let stats = compute_route_stats(&points);
        let color = colors::allocate(&colors_in_use);
        colors_in_use.push(color.clone());

        new_routes.push(Route {
            id: store.next_id("route"),
            name: route_name(&file.name),
            description: "Imported from GPX".to_string(),
            folder_id: folder_id.to_string(),
            points,
            stats,
            color,
            is_visible: true,
        });
    }

    let imported = new_routes.len();
    store.add_routes(new_routes);

    ImportSummary { imported, skipped }
}

/// Flatten every track segment of a GPX document into one point sequence.
/// Points without elevation default to 0.
fn parse_track_points(contents: &str) -> crate::Result<Vec<RoutePoint>> {
    let reader = std::io::BufReader::new(contents.as_bytes());
    let document = gpx::read(reader).map_err(|err| Error::parse(err.to_string()))?;

    let mut points = Vec::new();
    for track in &document.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                let position = waypoint.point();
                points.push(RoutePoint {
                    lat: position.y(),
                    lon: position.x(),
                    ele: waypoint.elevation.unwrap_or(0.0),
                });
            }
        }
    }
    Ok(points)
}

fn route_name(file_name: &str) -> String {
    file_name
        .strip_suffix(".gpx")
        .unwrap_or(file_name)
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
