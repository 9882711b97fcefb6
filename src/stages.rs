//! # Stage Segmenter
//!
//! Splits a trail into daily walking stages under two planning modes:
//!
//! - **Official**: the trail's predefined stage table, optionally reversed
//!   and sliced to a sub-range.
//! - **Custom**: greedy forward segmentation by a target kilometers-per-day,
//!   honoring per-stage endpoint overrides and detour carry-over.
//!
//! Both modes are pure functions producing the same [`Stage`] contract, so
//! callers can always rebuild the full list from scratch instead of
//! patching it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_km, nearest_index_by_distance};
use crate::track::{Direction, TrackProfile};
use crate::{DetourInfo, LatLon, RouteStop, StageAdjustment, TrackPosition};

/// Hard cap on the number of custom stages produced in one segmentation.
///
/// Guards against pathological inputs (a non-positive target, an adjustment
/// that moves the cursor backwards) turning the greedy loop infinite.
pub const MAX_STAGES: usize = 100;

/// A trailing custom stage shorter than this is dropped, unless it is the
/// only stage of the plan.
pub const MIN_TRAILING_STAGE_KM: f64 = 1.0;

/// Search radius for naming a stage endpoint after a nearby place.
pub const PLACE_NAME_RADIUS_KM: f64 = 2.0;

/// One record of a trail's official stage table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficialStageDef {
    pub from: String,
    pub to: String,
    pub length_km: f64,
    /// Optional per-stage track source reference.
    #[serde(default)]
    pub track_source: Option<String>,
}

/// Inclusive index sub-range into the official stage list.
///
/// `start_idx` defaults to the first stage, `end_idx` to the last. Indices
/// are interpreted in the currently selected direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageRange {
    pub start_idx: Option<usize>,
    pub end_idx: Option<usize>,
}

/// Kilometer sub-range of the track to plan, in the current direction's
/// cumulative-distance space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KmRange {
    pub start_km: f64,
    pub end_km: f64,
}

impl KmRange {
    /// Normalize so that `start_km <= end_km`.
    ///
    /// The UI intent of selecting two points is unambiguous regardless of
    /// click order, so reversed input is swapped rather than rejected.
    pub fn normalized(self) -> Self {
        if self.start_km <= self.end_km {
            self
        } else {
            Self {
                start_km: self.end_km,
                end_km: self.start_km,
            }
        }
    }
}

/// A stage from the trail's official stage table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficialStage {
    /// 1-based display number, assigned after any reversal.
    pub ordinal: usize,
    pub from_label: String,
    pub to_label: String,
    pub length_km: f64,
}

/// A stage produced by custom kilometers-per-day segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomStage {
    /// 1-based display number.
    pub ordinal: usize,
    /// Planned start on the track, in the current direction's km space.
    pub range_start_km: f64,
    /// Planned end on the track. Usually equals the next stage's
    /// `range_start_km`; a detour adjustment may move the next start to
    /// the leave-trail point instead.
    pub range_end_km: f64,
    /// Walking distance for the day: track range plus any detour legs.
    pub length_km: f64,
    /// The end snapped to the nearest track point.
    pub end_point: Option<TrackPosition>,
    pub start_label: Option<String>,
    pub end_label: Option<String>,
    /// Walking leg from the leave-trail point to an adjusted endpoint POI.
    pub detour: Option<DetourInfo>,
    /// Walking leg back to the trail from the previous stage's POI.
    pub return_from_previous: Option<DetourInfo>,
    /// Round-trip excursions within the stage; never move the endpoints.
    pub route_stops: Vec<RouteStop>,
    pub has_detour: bool,
}

/// One planned daily stage, in either planning mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Stage {
    Official(OfficialStage),
    Custom(CustomStage),
}

impl Stage {
    /// 1-based display number.
    pub fn ordinal(&self) -> usize {
        match self {
            Stage::Official(s) => s.ordinal,
            Stage::Custom(s) => s.ordinal,
        }
    }

    /// The stage's reported walking distance.
    pub fn length_km(&self) -> f64 {
        match self {
            Stage::Official(s) => s.length_km,
            Stage::Custom(s) => s.length_km,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomStage> {
        match self {
            Stage::Custom(s) => Some(s),
            Stage::Official(_) => None,
        }
    }

    pub fn as_official(&self) -> Option<&OfficialStage> {
        match self {
            Stage::Official(s) => Some(s),
            Stage::Custom(_) => None,
        }
    }
}

/// Build the stage list for official mode.
///
/// Reversal flips the list order, renumbers ordinals from 1, and swaps each
/// stage's from/to labels. An optional inclusive range then slices the
/// list; a range whose start lies after its end (after clamping the end to
/// the table) yields an empty list, which is a valid displayed-as-empty
/// state rather than an error. An empty table also yields an empty list.
pub fn official_stages(
    table: &[OfficialStageDef],
    direction: Direction,
    range: Option<StageRange>,
) -> Vec<Stage> {
    if table.is_empty() {
        return Vec::new();
    }

    let oriented: Vec<OfficialStage> = match direction {
        Direction::Forward => table
            .iter()
            .enumerate()
            .map(|(i, def)| OfficialStage {
                ordinal: i + 1,
                from_label: def.from.clone(),
                to_label: def.to.clone(),
                length_km: def.length_km,
            })
            .collect(),
        Direction::Reversed => table
            .iter()
            .rev()
            .enumerate()
            .map(|(i, def)| OfficialStage {
                ordinal: i + 1,
                from_label: def.to.clone(),
                to_label: def.from.clone(),
                length_km: def.length_km,
            })
            .collect(),
    };

    let last = oriented.len() - 1;
    let (start, end) = match range {
        Some(r) => (r.start_idx.unwrap_or(0), r.end_idx.unwrap_or(last).min(last)),
        None => (0, last),
    };
    if start > end {
        return Vec::new();
    }

    oriented[start..=end]
        .iter()
        .cloned()
        .map(Stage::Official)
        .collect()
}

/// Find the nearest place-name waypoint within [`PLACE_NAME_RADIUS_KM`] of
/// a coordinate.
///
/// POI-category waypoints (camping, hotel, ...) are never used as default
/// place names; an adjusted endpoint carries its POI label explicitly.
pub fn nearest_place_label(profile: &TrackProfile, lat: f64, lon: f64) -> Option<String> {
    let target = LatLon::new(lat, lon);
    profile
        .waypoints
        .iter()
        .filter(|w| w.is_place_name())
        .map(|w| (haversine_km(w.coord(), target), w))
        .filter(|(d, _)| *d <= PLACE_NAME_RADIUS_KM)
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, w)| w.label.clone())
}

/// Build the stage list for custom kilometers-per-day mode.
///
/// Greedy forward segmentation over `[start_km, end_km]` (the full track by
/// default). Each step walks `target_km_per_day` unless a
/// [`StageAdjustment`] overrides the endpoint; an adjustment's leave-trail
/// point also determines where the *next* stage resumes, carrying the
/// return leg from the POI into that stage's length.
pub fn custom_stages(
    profile: &TrackProfile,
    target_km_per_day: f64,
    km_range: Option<KmRange>,
    adjustments: &BTreeMap<usize, StageAdjustment>,
    route_stops: &BTreeMap<usize, Vec<RouteStop>>,
) -> Vec<Stage> {
    if profile.points.len() < 2 {
        return Vec::new();
    }

    let range = km_range
        .map(KmRange::normalized)
        .unwrap_or(KmRange {
            start_km: 0.0,
            end_km: profile.total_km,
        });
    let start_km = range.start_km.clamp(0.0, profile.total_km);
    let overall_end_km = range.end_km.clamp(0.0, profile.total_km);

    let mut stages: Vec<Stage> = Vec::new();
    let mut current_km = start_km;
    let mut carry_return: Option<DetourInfo> = None;
    let mut prev_end_label: Option<String> = None;

    while current_km < overall_end_km && stages.len() < MAX_STAGES {
        let idx = stages.len();
        let adjustment = adjustments.get(&idx);

        let range_end_km = match adjustment {
            Some(adj) => adj.end_km.min(overall_end_km),
            None => (current_km + target_km_per_day).min(overall_end_km),
        };

        let stage_distance = range_end_km - current_km;
        // A sub-1-km trailing stage is dropped, but a plan always keeps
        // its first stage even when the whole range is that short.
        if stage_distance < MIN_TRAILING_STAGE_KM && idx > 0 {
            break;
        }

        let start_index = nearest_index_by_distance(&profile.points, current_km);
        let end_index = nearest_index_by_distance(&profile.points, range_end_km);
        let end_point = profile.position_at(end_index);

        let detour = adjustment.and_then(StageAdjustment::detour_info);
        let return_from_previous = carry_return.take();
        let stops = route_stops.get(&idx).cloned().unwrap_or_default();

        let mut length_km = stage_distance;
        if let Some(leg) = &detour {
            length_km += leg.distance_km;
        }
        if let Some(leg) = &return_from_previous {
            length_km += leg.distance_km;
        }
        for stop in &stops {
            length_km += stop.round_trip_km();
        }
        let has_detour =
            detour.is_some() || return_from_previous.is_some() || !stops.is_empty();

        let end_label = adjustment
            .and_then(|adj| adj.poi_label.clone())
            .or_else(|| nearest_place_label(profile, end_point.lat, end_point.lon));
        let start_label = if idx == 0 {
            let p = &profile.points[start_index];
            nearest_place_label(profile, p.lat, p.lon)
        } else {
            prev_end_label.clone()
        };

        // Where the next day resumes: after a detour the hiker returns to
        // the point where they left the trail, not to the adjusted end km.
        let next_km = match adjustment {
            Some(adj) => profile.km_at(adj.leave_trail_point.track_index),
            None => range_end_km,
        };
        carry_return = adjustment
            .and_then(StageAdjustment::detour_info)
            .map(|leg| leg.reversed());
        prev_end_label = end_label.clone();

        stages.push(Stage::Custom(CustomStage {
            ordinal: idx + 1,
            range_start_km: current_km,
            range_end_km,
            length_km,
            end_point: Some(end_point),
            start_label,
            end_label,
            detour,
            return_from_previous,
            route_stops: stops,
            has_detour,
        }));

        current_km = next_km;
    }

    stages
}

// ============================================================================
// Tests
// ============================================================================
