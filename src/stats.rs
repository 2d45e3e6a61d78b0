//! Geospatial statistics for GPS tracks.
//!
//! Distance uses the haversine formula on a spherical Earth (the `geo`
//! crate's implementation). Slope aggregation filters out segments steeper
//! than +/-50%, which on consumer GPS traces are elevation-sensor noise
//! rather than terrain.

use geo::{Distance, Haversine, Point};

use crate::{RoutePoint, RouteStats};

/// Segments at or above this absolute grade are excluded from slope
/// aggregation (they still count toward distance and elevation).
const MAX_CREDIBLE_SLOPE_PCT: f64 = 50.0;

/// Great-circle distance between two track points, in kilometers.
#[inline]
pub fn haversine_km(a: &RoutePoint, b: &RoutePoint) -> f64 {
    Haversine::distance(Point::new(a.lon, a.lat), Point::new(b.lon, b.lat)) / 1000.0
}

/// Compute the derived statistics for an ordered point sequence.
///
/// Callers are responsible for rejecting sequences shorter than 2 points
/// before creating a route; for such sequences every statistic is 0.
///
/// Consecutive duplicate coordinates contribute 0 distance and are excluded
/// from slope aggregation (no horizontal run to divide by), but their
/// elevation delta still counts toward gain/loss.
pub fn compute_route_stats(points: &[RoutePoint]) -> RouteStats {
    let mut distance_km = 0.0;
    let mut gain_m = 0.0;
    let mut loss_m = 0.0;
    let mut max_slope = f64::NEG_INFINITY;
    let mut min_slope = f64::INFINITY;
    let mut slope_sum = 0.0;
    let mut slope_count = 0u32;

    for pair in points.windows(2) {
        let (p1, p2) = (&pair[0], &pair[1]);
        let d_km = haversine_km(p1, p2);
        distance_km += d_km;

        let ele_diff = p2.ele - p1.ele;
        if ele_diff > 0.0 {
            gain_m += ele_diff;
        }
        if ele_diff < 0.0 {
            loss_m += ele_diff.abs();
        }

        if d_km == 0.0 {
            continue;
        }

        let slope = ele_diff / (d_km * 1000.0) * 100.0;
        if slope.abs() < MAX_CREDIBLE_SLOPE_PCT {
            max_slope = max_slope.max(slope);
            min_slope = min_slope.min(slope);
            slope_sum += slope;
            slope_count += 1;
        }
    }

    RouteStats {
        distance_km: round_to(distance_km, 2),
        elevation_gain_m: gain_m.round(),
        elevation_loss_m: loss_m.round(),
        avg_slope: if slope_count > 0 {
            round_to(slope_sum / slope_count as f64, 1)
        } else {
            0.0
        },
        max_slope: if max_slope.is_finite() {
            round_to(max_slope, 1)
        } else {
            0.0
        },
        min_slope: if min_slope.is_finite() {
            round_to(min_slope, 1)
        } else {
            0.0
        },
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn climb_then_descend() -> Vec<RoutePoint> {
        vec![
            RoutePoint::new(22.700, 114.100, 10.0),
            RoutePoint::new(22.701, 114.101, 15.0),
            RoutePoint::new(22.702, 114.102, 5.0),
        ]
    }

    #[test]
    fn test_haversine_known_distance() {
        // London to Paris, ~344 km
        let london = RoutePoint::new(51.5074, -0.1278, 0.0);
        let paris = RoutePoint::new(48.8566, 2.3522, 0.0);
        let d = haversine_km(&london, &paris);
        assert!((d - 343.5).abs() < 1.5, "got {}", d);
    }

    #[test]
    fn test_three_point_track() {
        let stats = compute_route_stats(&climb_then_descend());

        // Two diagonal ~151 m segments.
        assert!(
            (stats.distance_km - 0.30).abs() < 0.02,
            "distance {}",
            stats.distance_km
        );
        assert_eq!(stats.elevation_gain_m, 5.0);
        assert_eq!(stats.elevation_loss_m, 10.0);

        // Both grades are gentle enough to survive the noise filter.
        assert!(stats.max_slope > 0.0 && stats.max_slope < MAX_CREDIBLE_SLOPE_PCT);
        assert!(stats.min_slope < 0.0 && stats.min_slope > -MAX_CREDIBLE_SLOPE_PCT);
        assert!(stats.max_slope >= stats.avg_slope && stats.avg_slope >= stats.min_slope);
    }

    #[test]
    fn test_duplicate_points_count_elevation_not_slope() {
        // Second pair is a duplicate fix with an elevation jump.
        let points = vec![
            RoutePoint::new(22.700, 114.100, 10.0),
            RoutePoint::new(22.701, 114.101, 12.0),
            RoutePoint::new(22.701, 114.101, 20.0),
        ];
        let stats = compute_route_stats(&points);

        let moving_only = compute_route_stats(&points[..2]);
        assert_eq!(stats.distance_km, moving_only.distance_km);

        // The stationary climb still counts toward gain...
        assert_eq!(stats.elevation_gain_m, 10.0);
        // ...but only the moving segment feeds slope aggregation.
        assert_eq!(stats.max_slope, moving_only.max_slope);
        assert_eq!(stats.avg_slope, moving_only.avg_slope);
    }

    #[test]
    fn test_steep_segments_excluded_from_slope() {
        // ~151 m run with a 100 m climb: ~66% grade, i.e. sensor noise.
        let points = vec![
            RoutePoint::new(22.700, 114.100, 0.0),
            RoutePoint::new(22.701, 114.101, 100.0),
        ];
        let stats = compute_route_stats(&points);

        assert!(stats.distance_km > 0.0);
        assert_eq!(stats.elevation_gain_m, 100.0);
        assert_eq!(stats.avg_slope, 0.0);
        assert_eq!(stats.max_slope, 0.0);
        assert_eq!(stats.min_slope, 0.0);
    }

    #[test]
    fn test_flat_track_has_zero_slopes() {
        let points = vec![
            RoutePoint::new(22.700, 114.100, 50.0),
            RoutePoint::new(22.701, 114.101, 50.0),
        ];
        let stats = compute_route_stats(&points);
        assert_eq!(stats.elevation_gain_m, 0.0);
        assert_eq!(stats.elevation_loss_m, 0.0);
        assert_eq!(stats.avg_slope, 0.0);
        assert_eq!(stats.max_slope, 0.0);
        assert_eq!(stats.min_slope, 0.0);
    }

    #[test]
    fn test_nonnegative_invariants() {
        let stats = compute_route_stats(&climb_then_descend());
        assert!(stats.distance_km >= 0.0);
        assert!(stats.elevation_gain_m >= 0.0);
        assert!(stats.elevation_loss_m >= 0.0);
    }
}
