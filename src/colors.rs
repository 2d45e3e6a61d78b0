//! Display-color allocation for routes and folders.
//!
//! The palette is curated to stand out against outdoor basemaps (greens and
//! creams) and water (blues); greens, light blues, yellows and beiges are
//! deliberately absent. Allocation hands out unused colors first and falls
//! back to random reuse once the palette is exhausted.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Folder;

/// Curated high-contrast palette, lowercase hex.
pub const SAFE_COLORS: [&str; 17] = [
    "#ef4444", // Red-500
    "#f97316", // Orange-500
    "#ec4899", // Pink-500
    "#a855f7", // Purple-500
    "#6366f1", // Indigo-500
    "#d946ef", // Fuchsia-500
    "#f43f5e", // Rose-500
    "#8b5cf6", // Violet-500
    "#be185d", // Pink-700
    "#4338ca", // Indigo-700
    "#1e40af", // Blue-800
    "#b91c1c", // Red-700
    "#c2410c", // Orange-700
    "#7e22ce", // Purple-700
    "#be123c", // Rose-700
    "#0f172a", // Slate-900
    "#854d0e", // Yellow-800 (dark brownish gold)
];

/// Pick the first palette color not already in use (case-insensitive).
/// Once every palette entry is taken, collisions are permitted and a random
/// palette color is returned instead.
pub fn allocate(in_use: &[String]) -> String {
    let used: HashSet<String> = in_use.iter().map(|c| c.to_ascii_lowercase()).collect();
    for color in SAFE_COLORS {
        if !used.contains(color) {
            return color.to_string();
        }
    }
    random_color().to_string()
}

/// A uniformly random palette color.
pub fn random_color() -> &'static str {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as usize;
    SAFE_COLORS[nanos % SAFE_COLORS.len()]
}

/// Assign a random palette color to a folder that has none. Idempotent;
/// allocation is not deduplicated across folders.
pub fn ensure_color(folder: Folder) -> Folder {
    if folder.color.is_some() {
        folder
    } else {
        Folder {
            color: Some(random_color().to_string()),
            ..folder
        }
    }
}

/// Backfill missing colors across a folder collection.
pub fn ensure_folder_colors(folders: Vec<Folder>) -> Vec<Folder> {
    folders.into_iter().map(ensure_color).collect()
}

// ============================================================================
// Tests
// ============================================================================
