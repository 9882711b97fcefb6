//! # Track Parser
//!
//! Turns a raw GPX source into a [`TrackProfile`]: an ordered point sequence
//! annotated with cumulative walking distance, plus the waypoints that came
//! with the track. Profiles are cached per `(source, direction)` so that
//! repeated plan rebuilds reuse the same allocation.
//!
//! Malformed vertices and waypoints are skipped, never fatal. A source with
//! fewer than 2 valid points yields no profile at all, which downstream
//! consumers treat as a first-class "no data" state.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{PlannerError, Result};
use crate::geo_utils::haversine_km;
use crate::{Bounds, LatLon, TrackPoint, TrackPosition, Waypoint};

/// Stride for the sampled waypoint distance-to-track computation.
///
/// Checking every 10th track point instead of every point is an explicit
/// accuracy/performance tradeoff: tracks can carry tens of thousands of
/// vertices, and the sampled distance is only used for filtering radii
/// measured in kilometers.
pub const WAYPOINT_SAMPLE_STRIDE: usize = 10;

/// Walking direction of a profile. Part of the profile cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Reversed,
}

impl Direction {
    /// The opposite walking direction.
    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Reversed,
            Direction::Reversed => Direction::Forward,
        }
    }
}

/// One record of an external waypoint enrichment file.
///
/// When such a file accompanies a track source it supersedes the in-track
/// waypoint markers and supplies the nearest-distance annotation
/// precomputed, avoiding the sampled search at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointRecord {
    pub lat: f64,
    pub lon: f64,
    #[serde(alias = "name")]
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub distance_to_track_km: Option<f64>,
}

/// A parsed track: distance-indexed points, total length, and waypoints.
///
/// Built once per `(source, direction)` pair and immutable thereafter; a
/// direction change builds a fresh profile rather than mutating this one.
/// Invariant: `total_km == points.last().cumulative_km`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackProfile {
    pub points: Vec<TrackPoint>,
    pub total_km: f64,
    pub waypoints: Vec<Waypoint>,
    pub bounds: Option<Bounds>,
}

impl TrackProfile {
    /// Build a profile from raw `(lat, lon, elevation)` vertices.
    ///
    /// Invalid vertices are skipped. If `direction` is reversed the vertex
    /// order is reversed *before* cumulative distances are computed, so the
    /// distance axis always increases in the selected walking direction.
    ///
    /// Returns `None` when fewer than 2 valid vertices remain.
    pub fn from_coords(
        coords: &[(f64, f64, Option<f64>)],
        mut waypoints: Vec<Waypoint>,
        direction: Direction,
    ) -> Option<Self> {
        let mut valid: Vec<(LatLon, Option<f64>)> = coords
            .iter()
            .filter_map(|&(lat, lon, ele)| {
                let c = LatLon::new(lat, lon);
                c.is_valid().then_some((c, ele))
            })
            .collect();

        if valid.len() < 2 {
            return None;
        }

        if direction == Direction::Reversed {
            valid.reverse();
        }

        let mut points = Vec::with_capacity(valid.len());
        let mut cumulative_km = 0.0;
        for (i, &(c, elevation)) in valid.iter().enumerate() {
            if i > 0 {
                cumulative_km += haversine_km(valid[i - 1].0, c);
            }
            points.push(TrackPoint {
                lat: c.lat,
                lon: c.lon,
                elevation,
                cumulative_km,
            });
        }

        annotate_waypoint_distances(&mut waypoints, &points);

        let coords_only: Vec<LatLon> = points.iter().map(TrackPoint::coord).collect();
        Some(Self {
            total_km: cumulative_km,
            bounds: Bounds::from_latlons(&coords_only),
            points,
            waypoints,
        })
    }

    /// Build a profile from a parsed GPX document, using the waypoint
    /// markers embedded in the track.
    pub fn from_gpx(gpx: &gpx::Gpx, direction: Direction) -> Option<Self> {
        let coords = gpx_vertices(gpx);
        let waypoints = gpx_waypoints(gpx);
        Self::from_coords(&coords, waypoints, direction)
    }

    /// Build a profile from a parsed GPX document with an external waypoint
    /// enrichment file.
    ///
    /// The enrichment records replace the in-track waypoint markers
    /// entirely and carry their own distance annotations, so the sampled
    /// distance search is skipped.
    pub fn from_gpx_with_enrichment(
        gpx: &gpx::Gpx,
        direction: Direction,
        records: &[WaypointRecord],
    ) -> Option<Self> {
        let coords = gpx_vertices(gpx);
        let waypoints = enrichment_waypoints(records);
        // Enrichment distances are authoritative; from_coords only fills
        // the entries the file left blank.
        Self::from_coords(&coords, waypoints, direction)
    }

    /// Cumulative distance of the point at `index`, clamped to the profile.
    pub fn km_at(&self, index: usize) -> f64 {
        match self.points.get(index) {
            Some(p) => p.cumulative_km,
            None => self.total_km,
        }
    }

    /// The track position at `index`, clamped to the last point.
    pub fn position_at(&self, index: usize) -> TrackPosition {
        let idx = index.min(self.points.len().saturating_sub(1));
        match self.points.get(idx) {
            Some(p) => TrackPosition {
                lat: p.lat,
                lon: p.lon,
                track_index: idx,
            },
            None => TrackPosition {
                lat: 0.0,
                lon: 0.0,
                track_index: 0,
            },
        }
    }
}

/// Read a GPX document from a reader.
pub fn read_gpx<R: Read>(reader: R) -> Result<gpx::Gpx> {
    gpx::read(reader).map_err(|e| PlannerError::GpxRead(e.to_string()))
}

/// Parse a waypoint enrichment document (a JSON array of records).
///
/// Returns `None` when the document is not a JSON array at all; individual
/// malformed records are skipped.
pub fn parse_enrichment(json: &str) -> Option<Vec<WaypointRecord>> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let items = value.as_array()?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<WaypointRecord>(item.clone()) {
            Ok(record) if LatLon::new(record.lat, record.lon).is_valid() => records.push(record),
            Ok(_) | Err(_) => {
                debug!("Skipping malformed waypoint enrichment record");
            }
        }
    }
    Some(records)
}

fn gpx_vertices(gpx: &gpx::Gpx) -> Vec<(f64, f64, Option<f64>)> {
    let mut coords = Vec::new();
    for track in &gpx.tracks {
        for seg in &track.segments {
            for pt in &seg.points {
                coords.push((pt.point().y(), pt.point().x(), pt.elevation));
            }
        }
    }
    coords
}

fn gpx_waypoints(gpx: &gpx::Gpx) -> Vec<Waypoint> {
    gpx.waypoints
        .iter()
        .filter_map(|wpt| {
            let coord = LatLon::new(wpt.point().y(), wpt.point().x());
            if !coord.is_valid() {
                return None;
            }
            let label = wpt
                .name
                .clone()
                .or_else(|| wpt.description.clone())
                .unwrap_or_else(|| "Waypoint".to_string());
            Some(Waypoint {
                lat: coord.lat,
                lon: coord.lon,
                label,
                category: wpt.type_.as_ref().map(|t| t.to_lowercase()),
                distance_to_track_km: None,
            })
        })
        .collect()
}

fn enrichment_waypoints(records: &[WaypointRecord]) -> Vec<Waypoint> {
    records
        .iter()
        .map(|r| Waypoint {
            lat: r.lat,
            lon: r.lon,
            label: r.label.clone(),
            category: r.category.as_ref().map(|c| c.to_lowercase()),
            distance_to_track_km: r.distance_to_track_km,
        })
        .collect()
}

/// Fill in `distance_to_track_km` for waypoints that lack it, checking
/// every [`WAYPOINT_SAMPLE_STRIDE`]th track point.
fn annotate_waypoint_distances(waypoints: &mut [Waypoint], points: &[TrackPoint]) {
    if points.is_empty() {
        return;
    }

    let annotate = |wp: &mut Waypoint| {
        if wp.distance_to_track_km.is_some() {
            return;
        }
        let coord = wp.coord();
        let best = points
            .iter()
            .step_by(WAYPOINT_SAMPLE_STRIDE)
            .map(|p| haversine_km(p.coord(), coord))
            .fold(f64::INFINITY, f64::min);
        if best.is_finite() {
            wp.distance_to_track_km = Some(best);
        }
    };

    #[cfg(feature = "parallel")]
    waypoints.par_iter_mut().for_each(annotate);

    #[cfg(not(feature = "parallel"))]
    waypoints.iter_mut().for_each(annotate);
}

// ============================================================================
// Profile cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProfileKey {
    source: String,
    direction: Direction,
}

/// Process-wide profile cache. Populated on first use, never evicted;
/// overwriting an entry with an equal value is harmless.
static PROFILE_CACHE: Lazy<Mutex<HashMap<ProfileKey, Arc<TrackProfile>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Get the cached profile for `(source_id, direction)`, building it with
/// `load` on a miss.
///
/// A cache hit returns the same `Arc` as previous calls, which lets
/// consumers short-circuit on pointer equality. A loader returning `None`
/// ("no profile available") is not cached.
pub fn profile_for<F>(source_id: &str, direction: Direction, load: F) -> Option<Arc<TrackProfile>>
where
    F: FnOnce() -> Option<TrackProfile>,
{
    let key = ProfileKey {
        source: source_id.to_string(),
        direction,
    };

    if let Some(profile) = PROFILE_CACHE.lock().ok()?.get(&key) {
        debug!("Profile cache hit for {} ({:?})", source_id, direction);
        return Some(Arc::clone(profile));
    }

    let profile = Arc::new(load()?);
    info!(
        "Parsed profile {} ({:?}): {:.1} km, {} points, {} waypoints",
        source_id,
        direction,
        profile.total_km,
        profile.points.len(),
        profile.waypoints.len()
    );
    PROFILE_CACHE
        .lock()
        .ok()?
        .insert(key, Arc::clone(&profile));
    Some(profile)
}

/// Look up a cached profile without building on a miss.
pub fn cached_profile(source_id: &str, direction: Direction) -> Option<Arc<TrackProfile>> {
    let key = ProfileKey {
        source: source_id.to_string(),
        direction,
    };
    PROFILE_CACHE.lock().ok()?.get(&key).map(Arc::clone)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Points 0.01 degrees of latitude apart are ~1.11 km apart
    fn sample_coords() -> Vec<(f64, f64, Option<f64>)> {
        vec![
            (47.00, 11.00, Some(1200.0)),
            (47.01, 11.00, Some(1250.0)),
            (47.02, 11.00, Some(1230.0)),
            (47.03, 11.00, None),
            (47.04, 11.00, Some(1300.0)),
        ]
    }

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="47.005" lon="11.001"><name>Obernberg</name></wpt>
  <wpt lat="47.015" lon="11.002"><desc>Old bridge</desc><type>Camping</type></wpt>
  <wpt lat="47.025" lon="11.003"></wpt>
  <trk><trkseg>
    <trkpt lat="47.00" lon="11.00"><ele>1200</ele></trkpt>
    <trkpt lat="47.01" lon="11.00"><ele>1250</ele></trkpt>
    <trkpt lat="47.02" lon="11.00"><ele>1230</ele></trkpt>
  </trkseg></trk>
</gpx>"#;

    #[test]
    fn test_cumulative_distance_monotonic() {
        let profile = TrackProfile::from_coords(&sample_coords(), vec![], Direction::Forward)
            .expect("profile");

        assert_eq!(profile.points[0].cumulative_km, 0.0);
        for w in profile.points.windows(2) {
            assert!(w[1].cumulative_km >= w[0].cumulative_km);
        }
        let last = profile.points.last().unwrap();
        assert_eq!(profile.total_km, last.cumulative_km);
        assert!(profile.total_km > 4.0 && profile.total_km < 5.0);
    }

    #[test]
    fn test_invalid_vertices_skipped() {
        let mut coords = sample_coords();
        coords.insert(2, (f64::NAN, 11.00, None));
        coords.insert(3, (95.0, 11.00, None));

        let profile =
            TrackProfile::from_coords(&coords, vec![], Direction::Forward).expect("profile");
        assert_eq!(profile.points.len(), 5);
    }

    #[test]
    fn test_too_few_valid_points() {
        let coords = vec![(47.0, 11.0, None), (f64::NAN, 11.0, None)];
        assert!(TrackProfile::from_coords(&coords, vec![], Direction::Forward).is_none());
    }

    #[test]
    fn test_reversal_round_trip() {
        let coords = sample_coords();
        let forward =
            TrackProfile::from_coords(&coords, vec![], Direction::Forward).expect("forward");
        let reversed =
            TrackProfile::from_coords(&coords, vec![], Direction::Reversed).expect("reversed");

        // Reversing the reversed profile's vertex order restores the original
        let twice: Vec<_> = reversed
            .points
            .iter()
            .rev()
            .map(|p| (p.lat, p.lon, p.elevation))
            .collect();
        let original: Vec<_> = forward
            .points
            .iter()
            .map(|p| (p.lat, p.lon, p.elevation))
            .collect();
        assert_eq!(twice, original);

        // Distances are recomputed, not reused; totals agree to tolerance
        assert!((forward.total_km - reversed.total_km).abs() < 1e-6);
        assert_eq!(reversed.points[0].cumulative_km, 0.0);
    }

    #[test]
    fn test_from_gpx_waypoint_label_fallback() {
        let gpx = read_gpx(SAMPLE_GPX.as_bytes()).expect("gpx parses");
        let profile = TrackProfile::from_gpx(&gpx, Direction::Forward).expect("profile");

        assert_eq!(profile.points.len(), 3);
        assert_eq!(profile.waypoints.len(), 3);
        assert_eq!(profile.waypoints[0].label, "Obernberg");
        // Falls back to the description, category is lowercased
        assert_eq!(profile.waypoints[1].label, "Old bridge");
        assert_eq!(profile.waypoints[1].category.as_deref(), Some("camping"));
        // Falls back to the generic placeholder
        assert_eq!(profile.waypoints[2].label, "Waypoint");
    }

    #[test]
    fn test_waypoint_distance_annotated() {
        let gpx = read_gpx(SAMPLE_GPX.as_bytes()).expect("gpx parses");
        let profile = TrackProfile::from_gpx(&gpx, Direction::Forward).expect("profile");

        for wp in &profile.waypoints {
            let d = wp.distance_to_track_km.expect("annotated");
            assert!(d >= 0.0 && d < 5.0);
        }
    }

    #[test]
    fn test_enrichment_supersedes_in_track_waypoints() {
        let gpx = read_gpx(SAMPLE_GPX.as_bytes()).expect("gpx parses");
        let records = vec![WaypointRecord {
            lat: 47.012,
            lon: 11.001,
            label: "Gasthof Post".to_string(),
            category: Some("Hotel".to_string()),
            distance_to_track_km: Some(0.09),
        }];
        let profile = TrackProfile::from_gpx_with_enrichment(&gpx, Direction::Forward, &records)
            .expect("profile");

        assert_eq!(profile.waypoints.len(), 1);
        assert_eq!(profile.waypoints[0].label, "Gasthof Post");
        assert_eq!(profile.waypoints[0].category.as_deref(), Some("hotel"));
        // Precomputed distance passed through untouched
        assert_eq!(profile.waypoints[0].distance_to_track_km, Some(0.09));
    }

    #[test]
    fn test_parse_enrichment_skips_malformed_records() {
        let json = r#"[
            {"lat": 47.0, "lon": 11.0, "label": "A", "category": "camping"},
            {"lat": "oops", "lon": 11.0, "label": "B"},
            {"lat": 99.5, "lon": 11.0, "label": "C"},
            {"lat": 47.1, "lon": 11.1, "name": "D", "distance_to_track_km": 0.5}
        ]"#;
        let records = parse_enrichment(json).expect("array parses");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "A");
        assert_eq!(records[1].label, "D");
        assert_eq!(records[1].distance_to_track_km, Some(0.5));
    }

    #[test]
    fn test_parse_enrichment_rejects_non_array() {
        assert!(parse_enrichment("{\"lat\": 1}").is_none());
        assert!(parse_enrichment("not json").is_none());
    }

    #[test]
    fn test_profile_cache_returns_same_arc() {
        let coords = sample_coords();
        let first = profile_for("cache-test-trail", Direction::Forward, || {
            TrackProfile::from_coords(&coords, vec![], Direction::Forward)
        })
        .expect("built");

        // Second call must not invoke the loader
        let second = profile_for("cache-test-trail", Direction::Forward, || {
            panic!("loader called on cache hit")
        })
        .expect("cached");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(cached_profile("cache-test-trail", Direction::Forward).is_some());
        // The other direction is a distinct key
        assert!(cached_profile("cache-test-trail", Direction::Reversed).is_none());
    }

    #[test]
    fn test_profile_cache_does_not_store_failures() {
        let missing = profile_for("cache-test-empty", Direction::Forward, || None);
        assert!(missing.is_none());
        assert!(cached_profile("cache-test-empty", Direction::Forward).is_none());
    }

    #[test]
    fn test_km_at_clamps() {
        let profile = TrackProfile::from_coords(&sample_coords(), vec![], Direction::Forward)
            .expect("profile");
        assert_eq!(profile.km_at(0), 0.0);
        assert_eq!(profile.km_at(999), profile.total_km);
        assert_eq!(profile.position_at(999).track_index, profile.points.len() - 1);
    }
}
