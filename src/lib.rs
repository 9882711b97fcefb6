//! # Trail Planner
//!
//! Trail-geometry and stage-planning engine for long-distance hiking routes.
//!
//! This library provides:
//! - GPX track parsing into distance-indexed profiles
//! - Daily stage segmentation (official stage tables or km-per-day splits)
//! - POI lookup and walking-detour planning against a routing collaborator
//! - Calendar itineraries with rest days, and elevation statistics
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel waypoint annotation with rayon
//! - **`http`** - Enable HTTP clients for routing and POI enrichment
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_planner::{derive_stages, Direction, PlanMode, PlanningState, TrackProfile};
//!
//! // A short track along a meridian, roughly 1.1 km between points
//! let coords = vec![
//!     (47.00, 11.00, Some(1200.0)),
//!     (47.01, 11.00, Some(1250.0)),
//!     (47.02, 11.00, Some(1230.0)),
//! ];
//! let profile = TrackProfile::from_coords(&coords, Vec::new(), Direction::Forward).unwrap();
//!
//! let mut state = PlanningState::new();
//! state.plan_mode = PlanMode::Custom;
//! state.target_km_per_day = 1.0;
//!
//! let stages = derive_stages(&profile, &[], &state);
//! assert_eq!(stages.len(), 2); // the trailing 0.2 km remainder is dropped
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{PlannerError, Result};

// Geodesy primitives (haversine, nearest-point searches)
pub mod geo_utils;
pub use geo_utils::{haversine_km, nearest_index_by_distance, nearest_point_index};

// Track parsing (GPX -> distance-indexed profile) and the profile cache
pub mod track;
pub use track::{profile_for, Direction, TrackProfile, WaypointRecord};

// Elevation statistics over profile sub-ranges
pub mod elevation;
pub use elevation::{elevation_stats, ElevationStats};

// Stage segmentation (official table and custom km-per-day modes)
pub mod stages;
pub use stages::{
    custom_stages, official_stages, CustomStage, KmRange, OfficialStage, OfficialStageDef, Stage,
    StageRange,
};

// POI lookup and detour planning
pub mod poi;
pub use poi::{choose_best_leave_point, find_nearest_poi, plan_detour, PoiLookup, PoiMatch, RouteProvider};

// Calendar itinerary expansion
pub mod calendar;
pub use calendar::{build_itinerary, group_by_month, ItineraryDay};

// The planning-state aggregate and the full-recompute entry point
pub mod planning;
pub use planning::{derive_stages, PlanMode, PlannerPreferences, PlanningState, PoiFilter};

// GPX export of planned stages
pub mod export;

// Algorithm toolbox - modular access to all algorithms
pub mod algorithms;

// HTTP clients for the routing / POI-detail collaborators
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{PoiDetails, PoiDetailsClient, RoutingClient};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use trail_planner::LatLon;
/// let point = LatLon::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    /// Create a new coordinate.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check that the coordinate is finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lon >= -180.0
            && self.lon <= 180.0
    }
}

/// One vertex of a parsed track, annotated with the cumulative distance
/// walked from the start of the profile in the current direction.
///
/// `cumulative_km` is monotonically non-decreasing and starts at 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    pub cumulative_km: f64,
}

impl TrackPoint {
    /// The point's coordinate without the profile annotations.
    #[inline]
    pub fn coord(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// A position on the track: a coordinate plus the index of the underlying
/// track point it was snapped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPosition {
    pub lat: f64,
    pub lon: f64,
    pub track_index: usize,
}

impl TrackPosition {
    #[inline]
    pub fn coord(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Waypoint categories that identify points of interest.
///
/// Waypoints in these categories drive POI filtering and detour planning and
/// are never used as default place names for stage endpoints.
pub const POI_CATEGORIES: &[&str] = &[
    "camping",
    "hotel",
    "hostel",
    "shelter",
    "hut",
    "water",
    "restaurant",
    "cafe",
    "bakery",
    "supermarket",
    "pharmacy",
    "bench",
    "bus",
    "train",
];

/// Check whether a (lowercased) category string identifies a POI category.
pub fn is_poi_category(category: &str) -> bool {
    POI_CATEGORIES.contains(&category)
}

/// A named point of interest or place name associated with a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    /// Display label, never empty (parsing falls back to a placeholder).
    pub label: String,
    /// Lowercased category used for filtering; `None` for plain place names.
    pub category: Option<String>,
    /// Sampled nearest distance to the track; `None` until computed.
    pub distance_to_track_km: Option<f64>,
}

impl Waypoint {
    #[inline]
    pub fn coord(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    /// Whether this waypoint is a point of interest (camping, hotel, ...).
    pub fn is_poi(&self) -> bool {
        self.category.as_deref().is_some_and(is_poi_category)
    }

    /// Whether this waypoint may serve as a place name for stage endpoints.
    pub fn is_place_name(&self) -> bool {
        !self.is_poi()
    }
}

/// Bounding box for a track or stage geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Create bounds from coordinates. Returns `None` for empty input.
    pub fn from_latlons(points: &[LatLon]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lon = min_lon.min(p.lon);
            max_lon = max_lon.max(p.lon);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

/// An off-track walking leg: route geometry, length, and optional duration.
///
/// The leg is one-way. Round-trip consumers (route stops) double the
/// distance themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetourInfo {
    pub coordinates: Vec<LatLon>,
    pub distance_km: f64,
    pub duration_seconds: Option<f64>,
}

impl DetourInfo {
    /// The same leg walked in the opposite direction.
    pub fn reversed(&self) -> Self {
        let mut coordinates = self.coordinates.clone();
        coordinates.reverse();
        Self {
            coordinates,
            distance_km: self.distance_km,
            duration_seconds: self.duration_seconds,
        }
    }
}

/// A round-trip detour within a stage.
///
/// Route stops add their round-trip distance to the stage's reported length
/// but never move the stage's start or end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    /// Identity of the visited POI.
    pub label: String,
    pub category: Option<String>,
    /// The trail point the round trip branches from.
    pub branch_point: TrackPosition,
    /// One-way leg from the branch point to the POI.
    pub leg: DetourInfo,
}

impl RouteStop {
    /// Out-and-back walking distance contributed to the stage.
    pub fn round_trip_km(&self) -> f64 {
        2.0 * self.leg.distance_km
    }
}

/// Why a stage endpoint was moved: a plain map click, or a POI of a given
/// category. Serialized as `"map"` or the category string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AdjustmentReason {
    Map,
    Poi(String),
}

impl From<String> for AdjustmentReason {
    fn from(s: String) -> Self {
        if s == "map" {
            AdjustmentReason::Map
        } else {
            AdjustmentReason::Poi(s)
        }
    }
}

impl From<AdjustmentReason> for String {
    fn from(r: AdjustmentReason) -> Self {
        match r {
            AdjustmentReason::Map => "map".to_string(),
            AdjustmentReason::Poi(category) => category,
        }
    }
}

/// A user override that moves a custom stage's endpoint, typically to align
/// with a point of interest.
///
/// Consumed when stages are rebuilt; removing the entry restores the
/// default split point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAdjustment {
    /// The overridden end of the stage, in the current direction's
    /// cumulative-distance space.
    pub end_km: f64,
    pub reason: AdjustmentReason,
    pub poi_label: Option<String>,
    pub poi_lat: f64,
    pub poi_lon: f64,
    /// Walking route from the leave point to the POI; `None` when the
    /// routing collaborator had no answer.
    pub detour_route: Option<Vec<LatLon>>,
    /// Walking distance of the detour, or the straight-line fallback.
    pub detour_distance_km: f64,
    /// Where the hiker leaves the trail; the next stage resumes here.
    pub leave_trail_point: TrackPosition,
    pub has_long_detour_warning: bool,
}

impl StageAdjustment {
    /// The detour leg carried by this adjustment, if it has any length.
    pub fn detour_info(&self) -> Option<DetourInfo> {
        if self.detour_distance_km <= 0.0 {
            return None;
        }
        Some(DetourInfo {
            coordinates: self.detour_route.clone().unwrap_or_default(),
            distance_km: self.detour_distance_km,
            duration_seconds: None,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
