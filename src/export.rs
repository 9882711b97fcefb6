//! GPX export of planned stages.
//!
//! Serializes one custom stage's walking geometry into a GPX document: the
//! return leg from the previous day's POI, the main-trail slice, the
//! endpoint detour, and each route stop as its own out-and-back segment,
//! with start/end waypoint markers. Official stages carry no geometry of
//! their own and are not exportable.

use std::io::Write;

use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment};

use crate::error::{PlannerError, Result};
use crate::geo_utils::nearest_index_by_distance;
use crate::stages::CustomStage;
use crate::track::TrackProfile;
use crate::LatLon;

fn marker(coord: LatLon, name: &str) -> gpx::Waypoint {
    let mut wpt = gpx::Waypoint::new(Point::new(coord.lon, coord.lat));
    wpt.name = Some(name.to_string());
    wpt
}

fn track_point(coord: LatLon) -> gpx::Waypoint {
    gpx::Waypoint::new(Point::new(coord.lon, coord.lat))
}

/// Collect a stage's full walking geometry in walking order: return leg
/// from the previous stage's POI, the track slice between the stage's
/// snapped endpoints, then the endpoint detour.
pub fn stage_geometry(profile: &TrackProfile, stage: &CustomStage) -> Vec<LatLon> {
    let start_idx = nearest_index_by_distance(&profile.points, stage.range_start_km);
    let end_idx = stage
        .end_point
        .map(|p| p.track_index)
        .unwrap_or_else(|| nearest_index_by_distance(&profile.points, stage.range_end_km));

    let mut coords = Vec::new();
    if let Some(back) = &stage.return_from_previous {
        coords.extend(back.coordinates.iter().copied());
    }
    if start_idx <= end_idx && end_idx < profile.points.len() {
        coords.extend(profile.points[start_idx..=end_idx].iter().map(|p| p.coord()));
    }
    if let Some(leg) = &stage.detour {
        coords.extend(leg.coordinates.iter().copied());
    }
    coords
}

/// Build a GPX document for one custom stage.
///
/// Returns `None` when the stage has no usable geometry.
pub fn stage_to_gpx(profile: &TrackProfile, stage: &CustomStage, trail_name: &str) -> Option<Gpx> {
    let coords = stage_geometry(profile, stage);
    let (&start, &end) = match (coords.first(), coords.last()) {
        (Some(s), Some(e)) if coords.len() >= 2 => (s, e),
        _ => return None,
    };

    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("trail-planner".to_string()),
        ..Gpx::default()
    };

    let mut track = Track::default();
    track.name = Some(format!("{} - Stage {}", trail_name, stage.ordinal));

    let mut segment = TrackSegment::new();
    segment.points = coords.iter().map(|&c| track_point(c)).collect();
    track.segments.push(segment);

    // Each route stop becomes its own out-and-back segment plus a marker
    // at the visited POI.
    for stop in &stage.route_stops {
        if stop.leg.coordinates.len() < 2 {
            continue;
        }
        let out = stop.leg.coordinates.iter();
        let back = stop.leg.coordinates.iter().rev().skip(1);
        let mut seg = TrackSegment::new();
        seg.points = out.chain(back).map(|&c| track_point(c)).collect();
        track.segments.push(seg);

        if let Some(&poi_end) = stop.leg.coordinates.last() {
            gpx.waypoints.push(marker(poi_end, &stop.label));
        }
    }

    let start_name = stage
        .start_label
        .clone()
        .unwrap_or_else(|| format!("Stage {} start", stage.ordinal));
    let end_name = stage
        .end_label
        .clone()
        .unwrap_or_else(|| format!("Stage {} end", stage.ordinal));
    gpx.waypoints.push(marker(start, &start_name));
    gpx.waypoints.push(marker(end, &end_name));

    gpx.tracks.push(track);
    Some(gpx)
}

/// Write one custom stage as a GPX document.
pub fn write_stage_gpx<W: Write>(
    writer: W,
    profile: &TrackProfile,
    stage: &CustomStage,
    trail_name: &str,
) -> Result<()> {
    let gpx = stage_to_gpx(profile, stage, trail_name)
        .ok_or_else(|| PlannerError::GpxWrite("stage has no geometry".to_string()))?;
    gpx::write(&gpx, writer).map_err(|e| PlannerError::GpxWrite(e.to_string()))
}
