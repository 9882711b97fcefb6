//! # Algorithm Toolbox
//!
//! Direct access to the planner's algorithms without the planning-state
//! layer. Use these to integrate individual pieces (geodesy, segmentation,
//! POI search, itineraries) into your own systems.
//!
//! # Example
//!
//! ```rust
//! use trail_planner::algorithms::{haversine_km, LatLon};
//!
//! let london = LatLon::new(51.5074, -0.1278);
//! let paris = LatLon::new(48.8566, 2.3522);
//! println!("London to Paris: {:.0} km", haversine_km(london, paris));
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{
    Bounds, DetourInfo, LatLon, RouteStop, StageAdjustment, TrackPoint, TrackPosition, Waypoint,
};

// =============================================================================
// Geodesy
// =============================================================================

pub use crate::geo_utils::{
    haversine_km, nearest_index_by_distance, nearest_point_index, polyline_length_km,
    EARTH_RADIUS_KM,
};

// =============================================================================
// Track Parsing
// =============================================================================

pub use crate::track::{
    parse_enrichment, read_gpx, Direction, TrackProfile, WaypointRecord, WAYPOINT_SAMPLE_STRIDE,
};

// =============================================================================
// Stage Segmentation
// =============================================================================

pub use crate::stages::{
    custom_stages, nearest_place_label, official_stages, CustomStage, KmRange, OfficialStage,
    OfficialStageDef, Stage, StageRange, MAX_STAGES, MIN_TRAILING_STAGE_KM, PLACE_NAME_RADIUS_KM,
};

// =============================================================================
// POI Search & Detour Planning
// =============================================================================

pub use crate::poi::{
    choose_best_leave_point, find_nearest_poi, plan_detour, LeaveCandidate, PoiLookup, PoiMatch,
    RouteProvider, DETOUR_ESCALATION_KM, LONG_DETOUR_WARNING_KM, SNAP_TOLERANCE_KM,
};

#[cfg(feature = "http")]
pub use crate::poi::choose_best_leave_point_concurrent;

// =============================================================================
// Itineraries & Elevation
// =============================================================================

pub use crate::calendar::{build_itinerary, group_by_month, ItineraryDay};
pub use crate::elevation::{elevation_stats, ElevationStats};

// =============================================================================
// GPX Export
// =============================================================================

pub use crate::export::{stage_geometry, stage_to_gpx, write_stage_gpx};
