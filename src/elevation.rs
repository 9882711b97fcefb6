//! Elevation statistics over a profile sub-range.
//!
//! Ascent and descent are accumulated from consecutive point pairs. A point
//! without elevation acts as a break: no contribution is counted across the
//! gap, rather than interpolating through it. When a sub-range has fewer
//! than 2 points with elevation at all, statistics are reported as
//! unavailable instead of as zeros.

use serde::{Deserialize, Serialize};

use crate::TrackPoint;

/// Aggregated elevation figures for a track sub-range, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationStats {
    pub ascent_m: f64,
    pub descent_m: f64,
    pub min_elevation_m: f64,
    pub max_elevation_m: f64,
}

/// Compute elevation statistics for `points[start_idx..=end_idx]`.
///
/// Indices are clamped to the sequence. Returns `None` when fewer than 2
/// points in the range carry elevation data.
pub fn elevation_stats(
    points: &[TrackPoint],
    start_idx: usize,
    end_idx: usize,
) -> Option<ElevationStats> {
    if points.is_empty() {
        return None;
    }

    let end = end_idx.min(points.len() - 1);
    let start = start_idx.min(end);
    let range = &points[start..=end];

    let elevated = range.iter().filter(|p| p.elevation.is_some()).count();
    if elevated < 2 {
        return None;
    }

    let mut ascent_m = 0.0;
    let mut descent_m = 0.0;
    let mut min_elevation_m = f64::MAX;
    let mut max_elevation_m = f64::MIN;

    for pair in range.windows(2) {
        if let (Some(prev), Some(cur)) = (pair[0].elevation, pair[1].elevation) {
            ascent_m += (cur - prev).max(0.0);
            descent_m += (prev - cur).max(0.0);
        }
    }

    for p in range {
        if let Some(ele) = p.elevation {
            min_elevation_m = min_elevation_m.min(ele);
            max_elevation_m = max_elevation_m.max(ele);
        }
    }

    Some(ElevationStats {
        ascent_m,
        descent_m,
        min_elevation_m,
        max_elevation_m,
    })
}
