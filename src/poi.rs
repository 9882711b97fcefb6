//! # POI Locator & Detour Planner
//!
//! Finds points of interest near a trail position and plans walking
//! detours to them through an injected routing collaborator.
//!
//! The routing collaborator is abstracted behind [`RouteProvider`] so the
//! two-phase candidate search stays unit-testable with deterministic stub
//! routers. Routing failures never abort an operation: the planner degrades
//! to a straight-line estimate and records the adjustment anyway.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_km, nearest_index_by_distance, nearest_point_index};
use crate::track::TrackProfile;
use crate::{AdjustmentReason, DetourInfo, LatLon, StageAdjustment, Waypoint};

/// Phase-2 candidate offsets are only tried when the best walking distance
/// after phase 1 still exceeds this.
pub const DETOUR_ESCALATION_KM: f64 = 1.0;

/// Walking distance above which an adjustment is flagged with a long-detour
/// warning. Informational; never blocks the adjustment.
pub const LONG_DETOUR_WARNING_KM: f64 = 3.0;

/// If the routed geometry starts farther than this from the chosen trail
/// point, the leave point is snapped to where the route actually begins.
pub const SNAP_TOLERANCE_KM: f64 = 0.01;

/// Phase-1 trail-leave candidates, as km offsets from the initial point.
const NEARBY_OFFSETS_KM: [f64; 5] = [-1.0, -0.5, 0.0, 0.5, 1.0];

/// Phase-2 candidates, tried only after escalation.
const DISTANT_OFFSETS_KM: [f64; 4] = [-2.0, -1.5, 1.5, 2.0];

/// A waypoint matched near a trail position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiMatch {
    pub waypoint: Waypoint,
    /// Straight-line distance from the anchor trail point to the waypoint.
    pub distance_km: f64,
    /// Index of the track point closest to the waypoint itself; the
    /// initial candidate for leaving the trail.
    pub track_index: usize,
}

/// Outcome of a POI search.
///
/// The two negative cases are deliberately distinct: "this category does
/// not exist in the data" and "it exists, but beyond your search radius"
/// suggest different corrective actions to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum PoiLookup {
    Found(PoiMatch),
    /// No waypoint of the requested category exists in the data at all.
    NoneOfCategory,
    /// The closest matching waypoint lies beyond the search radius.
    OutOfRange { nearest_km: f64 },
}

impl PoiLookup {
    /// The match, if any.
    pub fn found(self) -> Option<PoiMatch> {
        match self {
            PoiLookup::Found(m) => Some(m),
            _ => None,
        }
    }
}

/// Walking-route collaborator.
///
/// `None` covers both "no route exists" and transport failure; callers
/// treat the two identically and degrade to straight-line estimates.
pub trait RouteProvider {
    fn walking_route(
        &self,
        from: LatLon,
        to: LatLon,
    ) -> impl std::future::Future<Output = Option<DetourInfo>>;
}

/// A candidate point for leaving the trail, with the best route found.
#[derive(Debug, Clone)]
pub struct LeaveCandidate {
    pub track_index: usize,
    pub point: LatLon,
    pub route: Option<DetourInfo>,
    pub walking_km: f64,
}

/// Find the nearest waypoint of `category` around the track position at
/// `target_km`.
///
/// Matching is case-insensitive and exact on the category. "No POI in
/// range" is a normal outcome, not an error.
pub fn find_nearest_poi(
    profile: &TrackProfile,
    target_km: f64,
    category: &str,
    max_distance_km: f64,
) -> PoiLookup {
    let wanted = category.to_lowercase();
    let candidates: Vec<&Waypoint> = profile
        .waypoints
        .iter()
        .filter(|w| w.category.as_deref() == Some(wanted.as_str()))
        .collect();

    if candidates.is_empty() || profile.points.is_empty() {
        return PoiLookup::NoneOfCategory;
    }

    let anchor_idx = nearest_index_by_distance(&profile.points, target_km);
    let anchor = profile.points[anchor_idx].coord();

    let mut nearest: Option<(&Waypoint, f64)> = None;
    for w in candidates {
        let d = haversine_km(anchor, w.coord());
        match nearest {
            Some((_, best)) if d >= best => {}
            _ => nearest = Some((w, d)),
        }
    }
    let Some((nearest, nearest_km)) = nearest else {
        return PoiLookup::NoneOfCategory;
    };

    if nearest_km > max_distance_km {
        return PoiLookup::OutOfRange { nearest_km };
    }

    let (track_index, _) = nearest_point_index(&profile.points, nearest.lat, nearest.lon)
        .unwrap_or((anchor_idx, 0.0));

    PoiLookup::Found(PoiMatch {
        waypoint: nearest.clone(),
        distance_km: nearest_km,
        track_index,
    })
}

/// Probe one set of candidate offsets, updating the best candidate found.
async fn probe_offsets<R: RouteProvider>(
    profile: &TrackProfile,
    base_km: f64,
    poi: LatLon,
    provider: &R,
    offsets: &[f64],
    best: &mut Option<LeaveCandidate>,
) {
    for &offset in offsets {
        let km = base_km + offset;
        if km < 0.0 || km > profile.total_km {
            continue;
        }
        let track_index = nearest_index_by_distance(&profile.points, km);
        let point = profile.points[track_index].coord();

        let Some(route) = provider.walking_route(point, poi).await else {
            debug!("No route from candidate at {:.2} km", km);
            continue;
        };

        let walking_km = route.distance_km;
        if best.as_ref().map_or(true, |b| walking_km < b.walking_km) {
            *best = Some(LeaveCandidate {
                track_index,
                point,
                route: Some(route),
                walking_km,
            });
        }
    }
}

/// Choose the trail-leave point that minimizes walking distance to a POI.
///
/// Two-phase search: the nearby offsets are always tried; the distant ones
/// only when the best distance found so far still exceeds
/// [`DETOUR_ESCALATION_KM`] (or nothing was found at all). Requests are
/// issued sequentially because the escalation decision depends on the
/// phase-1 aggregate. Overlap between a detour and the main trail is not
/// penalized; only raw walking distance counts.
///
/// Returns `None` when no candidate produced a route.
pub async fn choose_best_leave_point<R: RouteProvider>(
    profile: &TrackProfile,
    initial_index: usize,
    poi: LatLon,
    provider: &R,
) -> Option<LeaveCandidate> {
    let base_km = profile.km_at(initial_index);
    let mut best: Option<LeaveCandidate> = None;

    probe_offsets(profile, base_km, poi, provider, &NEARBY_OFFSETS_KM, &mut best).await;

    let escalate = best
        .as_ref()
        .map_or(true, |b| b.walking_km > DETOUR_ESCALATION_KM);
    if escalate {
        probe_offsets(profile, base_km, poi, provider, &DISTANT_OFFSETS_KM, &mut best).await;
    }

    best
}

/// Concurrent variant: fires the phase-1 batch at once, then still gates
/// phase 2 on the aggregate result. Use when the routing collaborator
/// tolerates concurrent requests.
#[cfg(feature = "http")]
pub async fn choose_best_leave_point_concurrent<R: RouteProvider>(
    profile: &TrackProfile,
    initial_index: usize,
    poi: LatLon,
    provider: &R,
) -> Option<LeaveCandidate> {
    let base_km = profile.km_at(initial_index);

    let candidates: Vec<(usize, LatLon)> = NEARBY_OFFSETS_KM
        .iter()
        .filter_map(|&offset| {
            let km = base_km + offset;
            if km < 0.0 || km > profile.total_km {
                return None;
            }
            let track_index = nearest_index_by_distance(&profile.points, km);
            Some((track_index, profile.points[track_index].coord()))
        })
        .collect();

    let legs = futures::future::join_all(
        candidates
            .iter()
            .map(|&(_, point)| provider.walking_route(point, poi)),
    )
    .await;

    let mut best: Option<LeaveCandidate> = None;
    for ((track_index, point), route) in candidates.into_iter().zip(legs) {
        let Some(route) = route else { continue };
        let walking_km = route.distance_km;
        if best.as_ref().map_or(true, |b| walking_km < b.walking_km) {
            best = Some(LeaveCandidate {
                track_index,
                point,
                route: Some(route),
                walking_km,
            });
        }
    }

    let escalate = best
        .as_ref()
        .map_or(true, |b| b.walking_km > DETOUR_ESCALATION_KM);
    if escalate {
        probe_offsets(profile, base_km, poi, provider, &DISTANT_OFFSETS_KM, &mut best).await;
    }

    best
}

/// Plan a detour from the trail to a POI, producing the stage adjustment
/// that moves the stage's endpoint there.
///
/// When every routing request fails, the adjustment is still recorded: the
/// endpoint moves to the initial candidate and the distance falls back to
/// the straight line. The long-detour warning is purely informational.
pub async fn plan_detour<R: RouteProvider>(
    profile: &TrackProfile,
    leave_candidate_index: usize,
    poi: &Waypoint,
    provider: &R,
) -> StageAdjustment {
    let poi_coord = poi.coord();
    let best = choose_best_leave_point(profile, leave_candidate_index, poi_coord, provider).await;

    let (mut leave_index, route, walking_km) = match best {
        Some(c) => (c.track_index, c.route, c.walking_km),
        None => {
            let p = profile.position_at(leave_candidate_index);
            warn!(
                "No walking route to '{}'; falling back to straight-line distance",
                poi.label
            );
            (p.track_index, None, haversine_km(p.coord(), poi_coord))
        }
    };

    // Keep the stage-end marker where the drawn detour line begins: if the
    // returned geometry starts away from the chosen point, snap to the
    // track point nearest the actual route start.
    if let Some(leg) = &route {
        if let Some(&first) = leg.coordinates.first() {
            let chosen = profile.points[leave_index].coord();
            if haversine_km(chosen, first) > SNAP_TOLERANCE_KM {
                if let Some((snapped, _)) =
                    nearest_point_index(&profile.points, first.lat, first.lon)
                {
                    leave_index = snapped;
                }
            }
        }
    }

    let leave_trail_point = profile.position_at(leave_index);

    StageAdjustment {
        end_km: profile.km_at(leave_index),
        reason: AdjustmentReason::Poi(
            poi.category.clone().unwrap_or_else(|| "poi".to_string()),
        ),
        poi_label: Some(poi.label.clone()),
        poi_lat: poi.lat,
        poi_lon: poi.lon,
        detour_route: route.as_ref().map(|r| r.coordinates.clone()),
        detour_distance_km: walking_km,
        leave_trail_point,
        has_long_detour_warning: walking_km > LONG_DETOUR_WARNING_KM,
    }
}

// ============================================================================
// Tests
// ============================================================================
