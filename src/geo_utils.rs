//! # Geographic Utilities
//!
//! Core geodesy primitives for trail geometry.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance between two coordinates |
//! | [`polyline_length_km`] | Total length of a coordinate sequence |
//! | [`nearest_point_index`] | Index of the track point closest to a coordinate |
//! | [`nearest_index_by_distance`] | Index of the track point closest to a cumulative distance |
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees),
//! the standard used by GPS receivers and mapping services.

use crate::{LatLon, TrackPoint};

/// Mean Earth radius in kilometers used for all great-circle math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate the great-circle distance between two coordinates in kilometers
/// using the haversine formula.
///
/// The inner square-root operand is clamped to 1.0 before `asin`: for
/// antipodal-ish inputs floating-point error can push it fractionally above
/// 1, which would yield NaN.
///
/// # Example
///
/// ```rust
/// use trail_planner::{geo_utils::haversine_km, LatLon};
///
/// let london = LatLon::new(51.5074, -0.1278);
/// let paris = LatLon::new(48.8566, 2.3522);
/// let distance = haversine_km(london, paris);
/// assert!((distance - 343.5).abs() < 5.0);
/// ```
#[inline]
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Calculate the total length of a coordinate sequence in kilometers.
///
/// Sums the haversine distance between consecutive points. Empty or
/// single-point sequences return 0.0.
pub fn polyline_length_km(coords: &[LatLon]) -> f64 {
    if coords.len() < 2 {
        return 0.0;
    }

    coords.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

/// Find the track point closest to a coordinate.
///
/// Linear scan over the whole sequence; ties resolve to the first (lowest)
/// index. Returns `None` for an empty sequence.
///
/// # Returns
///
/// `(index, distance_km)` of the closest point.
pub fn nearest_point_index(points: &[TrackPoint], lat: f64, lon: f64) -> Option<(usize, f64)> {
    let target = LatLon::new(lat, lon);
    let mut best: Option<(usize, f64)> = None;

    for (i, p) in points.iter().enumerate() {
        let d = haversine_km(p.coord(), target);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }

    best
}

/// Find the track point whose cumulative distance is closest to `target_km`.
///
/// Binary search for the insertion point over the monotonically
/// non-decreasing `cumulative_km` values, then compares the neighbor on
/// each side and returns whichever is numerically closer. A tie favors the
/// earlier index. Returns 0 for an empty sequence.
pub fn nearest_index_by_distance(points: &[TrackPoint], target_km: f64) -> usize {
    if points.is_empty() {
        return 0;
    }

    let insertion = points.partition_point(|p| p.cumulative_km < target_km);

    if insertion == 0 {
        return 0;
    }
    if insertion >= points.len() {
        return points.len() - 1;
    }

    let before = insertion - 1;
    let dist_before = (target_km - points[before].cumulative_km).abs();
    let dist_after = (points[insertion].cumulative_km - target_km).abs();

    if dist_before <= dist_after {
        before
    } else {
        insertion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn track_with_cumulative(kms: &[f64]) -> Vec<TrackPoint> {
        kms.iter()
            .enumerate()
            .map(|(i, &km)| TrackPoint {
                lat: 51.5 + i as f64 * 0.001,
                lon: -0.12,
                elevation: None,
                cumulative_km: km,
            })
            .collect()
    }

    #[test]
    fn test_haversine_same_point() {
        let p = LatLon::new(51.5074, -0.1278);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn test_haversine_known_value() {
        // London to Paris is approximately 344 km
        let london = LatLon::new(51.5074, -0.1278);
        let paris = LatLon::new(48.8566, 2.3522);
        assert!(approx_eq(haversine_km(london, paris), 343.5, 5.0));
    }

    #[test]
    fn test_haversine_antipodal_no_nan() {
        // Antipodal points stress the asin clamp
        let a = LatLon::new(0.0, 0.0);
        let b = LatLon::new(0.0, 180.0);
        let d = haversine_km(a, b);
        assert!(d.is_finite());
        assert!(approx_eq(d, std::f64::consts::PI * EARTH_RADIUS_KM, 1.0));
    }

    #[test]
    fn test_polyline_length_degenerate() {
        assert_eq!(polyline_length_km(&[]), 0.0);
        assert_eq!(polyline_length_km(&[LatLon::new(51.5, -0.12)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let coords = vec![LatLon::new(51.5074, -0.1278), LatLon::new(51.5080, -0.1280)];
        let length = polyline_length_km(&coords);
        assert!(length > 0.0);
        assert!(length < 0.1); // about 68 m
    }

    #[test]
    fn test_nearest_point_index_empty() {
        assert_eq!(nearest_point_index(&[], 51.5, -0.12), None);
    }

    #[test]
    fn test_nearest_point_index_picks_closest() {
        let points = track_with_cumulative(&[0.0, 0.1, 0.2, 0.3]);
        // Exactly on the third point
        let (idx, dist) = nearest_point_index(&points, 51.502, -0.12).unwrap();
        assert_eq!(idx, 2);
        assert!(dist < 1e-9);
    }

    #[test]
    fn test_nearest_point_index_tie_takes_first() {
        let mut points = track_with_cumulative(&[0.0, 0.1, 0.2]);
        // Make points 0 and 2 identical; the probe is equidistant
        points[2].lat = points[0].lat;
        points[2].lon = points[0].lon;
        let (idx, _) = nearest_point_index(&points, points[0].lat, points[0].lon).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_nearest_index_by_distance_exact_hits() {
        let points = track_with_cumulative(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(nearest_index_by_distance(&points, 0.0), 0);
        assert_eq!(nearest_index_by_distance(&points, 2.0), 2);
        assert_eq!(nearest_index_by_distance(&points, 3.0), 3);
    }

    #[test]
    fn test_nearest_index_by_distance_between_points() {
        let points = track_with_cumulative(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(nearest_index_by_distance(&points, 1.2), 1);
        assert_eq!(nearest_index_by_distance(&points, 1.8), 2);
    }

    #[test]
    fn test_nearest_index_by_distance_tie_favors_earlier() {
        let points = track_with_cumulative(&[0.0, 1.0, 2.0]);
        assert_eq!(nearest_index_by_distance(&points, 1.5), 1);
    }

    #[test]
    fn test_nearest_index_by_distance_out_of_range() {
        let points = track_with_cumulative(&[0.0, 1.0, 2.0]);
        assert_eq!(nearest_index_by_distance(&points, -5.0), 0);
        assert_eq!(nearest_index_by_distance(&points, 99.0), 2);
        assert_eq!(nearest_index_by_distance(&[], 1.0), 0);
    }
}
