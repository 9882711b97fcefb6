//! # Planning State
//!
//! The mutable aggregate that ties direction, plan mode, range selection,
//! per-stage adjustments, rest days, and route stops together.
//!
//! The key invariant of the whole planner lives here: the stage list is
//! *always* rebuilt in full from `(TrackProfile, PlanningState)` via
//! [`derive_stages`], never patched incrementally. Every mutation helper
//! only edits the state; callers re-derive afterwards.
//!
//! `PlanningState` is a plain value type. Mutations are expected to come
//! from a single writer; in a concurrent environment they must be
//! serialized externally, because a rebuild reads several fields
//! non-atomically.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::geo_utils::nearest_point_index;
use crate::poi::{find_nearest_poi, PoiLookup};
use crate::stages::{custom_stages, official_stages, KmRange, OfficialStageDef, Stage, StageRange};
use crate::track::{Direction, TrackProfile};
use crate::{AdjustmentReason, RouteStop, StageAdjustment, POI_CATEGORIES};

/// Default daily walking target in kilometers.
pub const DEFAULT_TARGET_KM_PER_DAY: f64 = 20.0;

/// Default POI search radius in kilometers.
pub const DEFAULT_POI_RADIUS_KM: f64 = 5.0;

/// How the trail is split into stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Use the trail's predefined stage table.
    #[default]
    Official,
    /// Greedy kilometers-per-day segmentation.
    Custom,
}

/// Which POI categories the user wants offered, and how far off the trail
/// to search for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiFilter {
    pub enabled_categories: BTreeSet<String>,
    pub max_distance_km: f64,
}

impl Default for PoiFilter {
    fn default() -> Self {
        Self {
            enabled_categories: POI_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            max_distance_km: DEFAULT_POI_RADIUS_KM,
        }
    }
}

impl PoiFilter {
    pub fn is_enabled(&self, category: &str) -> bool {
        self.enabled_categories.contains(&category.to_lowercase())
    }
}

/// The aggregate root of a trail plan.
///
/// Sparse maps are keyed by the 0-based stage index in the currently
/// derived stage list; absence means default. All fields are serializable,
/// and the load path tolerates records saved by older versions (missing
/// fields take their defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningState {
    pub plan_mode: PlanMode,
    pub direction: Direction,
    pub target_km_per_day: f64,
    pub start_date: Option<NaiveDate>,
    /// Rest days inserted immediately after a stage. Zero entries are
    /// removed, never stored.
    pub rest_days: BTreeMap<usize, u32>,
    /// Official-mode sub-range of the stage table.
    pub stage_range: Option<StageRange>,
    /// Custom-mode sub-range of the track.
    pub km_range: Option<KmRange>,
    pub stage_adjustments: BTreeMap<usize, StageAdjustment>,
    pub route_stops: BTreeMap<usize, Vec<RouteStop>>,
    pub poi_filter: PoiFilter,
}

impl Default for PlanningState {
    fn default() -> Self {
        Self {
            plan_mode: PlanMode::default(),
            direction: Direction::default(),
            target_km_per_day: DEFAULT_TARGET_KM_PER_DAY,
            start_date: None,
            rest_days: BTreeMap::new(),
            stage_range: None,
            km_range: None,
            stage_adjustments: BTreeMap::new(),
            route_stops: BTreeMap::new(),
            poi_filter: PoiFilter::default(),
        }
    }
}

impl PlanningState {
    /// A fresh plan: official mode, forward direction, default target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch walking direction.
    ///
    /// Adjustments and route stops carry kilometer positions and track
    /// indices in the old direction's distance space, so they are cleared;
    /// rest days are calendar preferences and survive.
    pub fn set_direction(&mut self, direction: Direction) {
        if self.direction == direction {
            return;
        }
        self.direction = direction;
        self.stage_adjustments.clear();
        self.route_stops.clear();
    }

    /// Flip the walking direction.
    pub fn reverse(&mut self) {
        self.set_direction(self.direction.flipped());
    }

    pub fn set_plan_mode(&mut self, plan_mode: PlanMode) {
        self.plan_mode = plan_mode;
    }

    pub fn set_target_km_per_day(&mut self, target_km_per_day: f64) {
        self.target_km_per_day = target_km_per_day;
    }

    pub fn set_start_date(&mut self, start_date: Option<NaiveDate>) {
        self.start_date = start_date;
    }

    /// Select a kilometer sub-range. The endpoints may arrive in either
    /// order; they are normalized by swapping.
    pub fn set_km_range(&mut self, a_km: f64, b_km: f64) {
        self.km_range = Some(
            KmRange {
                start_km: a_km,
                end_km: b_km,
            }
            .normalized(),
        );
    }

    pub fn clear_km_range(&mut self) {
        self.km_range = None;
    }

    pub fn set_stage_range(&mut self, start_idx: Option<usize>, end_idx: Option<usize>) {
        self.stage_range = Some(StageRange { start_idx, end_idx });
    }

    pub fn clear_stage_range(&mut self) {
        self.stage_range = None;
    }

    /// Set the rest-day count after a stage; zero removes the entry.
    pub fn set_rest_days(&mut self, stage_index: usize, count: u32) {
        if count == 0 {
            self.rest_days.remove(&stage_index);
        } else {
            self.rest_days.insert(stage_index, count);
        }
    }

    pub fn add_rest_day(&mut self, stage_index: usize) {
        let count = self.rest_days.get(&stage_index).copied().unwrap_or(0);
        self.set_rest_days(stage_index, count + 1);
    }

    pub fn remove_rest_day(&mut self, stage_index: usize) {
        let count = self.rest_days.get(&stage_index).copied().unwrap_or(0);
        self.set_rest_days(stage_index, count.saturating_sub(1));
    }

    pub fn set_stage_adjustment(&mut self, stage_index: usize, adjustment: StageAdjustment) {
        self.stage_adjustments.insert(stage_index, adjustment);
    }

    /// Reset a stage to its default split point.
    pub fn clear_stage_adjustment(&mut self, stage_index: usize) {
        self.stage_adjustments.remove(&stage_index);
    }

    /// Attach a round-trip stop to a stage.
    pub fn add_route_stop(&mut self, stage_index: usize, stop: RouteStop) {
        self.route_stops.entry(stage_index).or_default().push(stop);
    }

    pub fn clear_route_stops(&mut self, stage_index: usize) {
        self.route_stops.remove(&stage_index);
    }

    /// Build a map-click adjustment: the stage ends at the track point
    /// nearest the clicked coordinate, with no detour involved.
    ///
    /// Returns `None` for an empty profile.
    pub fn map_click_adjustment(
        profile: &TrackProfile,
        lat: f64,
        lon: f64,
    ) -> Option<StageAdjustment> {
        let (track_index, _) = nearest_point_index(&profile.points, lat, lon)?;
        let leave_trail_point = profile.position_at(track_index);
        Some(StageAdjustment {
            end_km: profile.km_at(track_index),
            reason: AdjustmentReason::Map,
            poi_label: None,
            poi_lat: lat,
            poi_lon: lon,
            detour_route: None,
            detour_distance_km: 0.0,
            leave_trail_point,
            has_long_detour_warning: false,
        })
    }

    /// Search for a POI of `category` near the track position at
    /// `target_km`, honoring the user's POI filter.
    ///
    /// A category the user has disabled is not searched at all and reports
    /// as if absent from the data.
    pub fn find_poi_near(
        &self,
        profile: &TrackProfile,
        target_km: f64,
        category: &str,
    ) -> PoiLookup {
        if !self.poi_filter.is_enabled(category) {
            return PoiLookup::NoneOfCategory;
        }
        find_nearest_poi(profile, target_km, category, self.poi_filter.max_distance_km)
    }

    /// Rebuild the stage list from this state. See [`derive_stages`].
    pub fn derive_stages(
        &self,
        profile: &TrackProfile,
        official_table: &[OfficialStageDef],
    ) -> Vec<Stage> {
        derive_stages(profile, official_table, self)
    }
}

/// Rebuild the full stage list from a profile and planning state.
///
/// This is the single entry point for stage data: every meaningful edit
/// (direction, mode, range, adjustment, stop) is followed by a call here
/// rather than by patching the previous list.
pub fn derive_stages(
    profile: &TrackProfile,
    official_table: &[OfficialStageDef],
    state: &PlanningState,
) -> Vec<Stage> {
    match state.plan_mode {
        PlanMode::Official => official_stages(official_table, state.direction, state.stage_range),
        PlanMode::Custom => custom_stages(
            profile,
            state.target_km_per_day,
            state.km_range,
            &state.stage_adjustments,
            &state.route_stops,
        ),
    }
}

// ============================================================================
// Persisted preferences
// ============================================================================

/// Per-trail progress metadata kept alongside the preferences.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailProgress {
    pub completed_days: u32,
    pub last_visited: Option<NaiveDate>,
}

/// The durable subset of user preferences, stored by the key-value
/// persistence collaborator.
///
/// The schema evolves by adding fields; `#[serde(default)]` lets records
/// saved by older versions load with sensible defaults, and unknown fields
/// from newer versions are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerPreferences {
    pub target_km_per_day: f64,
    pub poi_filter: PoiFilter,
    pub trail_progress: BTreeMap<String, TrailProgress>,
}

impl Default for PlannerPreferences {
    fn default() -> Self {
        Self {
            target_km_per_day: DEFAULT_TARGET_KM_PER_DAY,
            poi_filter: PoiFilter::default(),
            trail_progress: BTreeMap::new(),
        }
    }
}

impl PlannerPreferences {
    /// Load preferences from a stored JSON record, falling back to
    /// defaults when the record is unreadable.
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_else(|e| {
            warn!("Unreadable preferences record, using defaults: {}", e);
            Self::default()
        })
    }

    /// Serialize for the persistence collaborator.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn official_table() -> Vec<OfficialStageDef> {
        (1..=5)
            .map(|i| OfficialStageDef {
                from: format!("Place {}", i),
                to: format!("Place {}", i + 1),
                length_km: 20.0,
                track_source: None,
            })
            .collect()
    }

    /// Straight north-running track, ~1.112 km between consecutive points.
    fn line_profile() -> TrackProfile {
        let coords: Vec<(f64, f64, Option<f64>)> =
            (0..91).map(|i| (47.0 + i as f64 * 0.01, 11.0, None)).collect();
        TrackProfile::from_coords(&coords, vec![], Direction::Forward).expect("profile")
    }

    #[test]
    fn test_official_mode_end_to_end() {
        // A 5-stage table with no range selection passes through unchanged
        let profile = line_profile();
        let state = PlanningState::new();
        let stages = derive_stages(&profile, &official_table(), &state);

        assert_eq!(stages.len(), 5);
        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.ordinal(), i + 1);
            assert_eq!(stage.length_km(), 20.0);
        }
    }

    #[test]
    fn test_mode_switch_rederives() {
        let profile = line_profile();
        let mut state = PlanningState::new();
        state.set_plan_mode(PlanMode::Custom);
        state.set_target_km_per_day(25.0);

        let stages = derive_stages(&profile, &official_table(), &state);
        assert!(stages.iter().all(|s| s.as_custom().is_some()));
        assert_eq!(stages.len(), 4); // ~100 km at 25 km/day, 0.08 km tail dropped
    }

    #[test]
    fn test_km_range_setter_normalizes() {
        let mut state = PlanningState::new();
        state.set_km_range(30.0, 10.0);
        let range = state.km_range.unwrap();
        assert_eq!(range.start_km, 10.0);
        assert_eq!(range.end_km, 30.0);
    }

    #[test]
    fn test_rest_day_helpers_remove_zero_entries() {
        let mut state = PlanningState::new();
        state.add_rest_day(2);
        state.add_rest_day(2);
        assert_eq!(state.rest_days.get(&2), Some(&2));

        state.remove_rest_day(2);
        state.remove_rest_day(2);
        assert!(!state.rest_days.contains_key(&2));

        // Removing from an absent entry stays absent
        state.remove_rest_day(7);
        assert!(!state.rest_days.contains_key(&7));

        state.set_rest_days(1, 3);
        state.set_rest_days(1, 0);
        assert!(!state.rest_days.contains_key(&1));
    }

    #[test]
    fn test_direction_change_clears_positional_overrides() {
        let profile = line_profile();
        let mut state = PlanningState::new();
        state.add_rest_day(1);
        let adjustment =
            PlanningState::map_click_adjustment(&profile, 47.2, 11.0).expect("adjustment");
        state.set_stage_adjustment(0, adjustment);

        state.reverse();
        assert_eq!(state.direction, Direction::Reversed);
        assert!(state.stage_adjustments.is_empty());
        // Rest days are calendar preferences, not positions
        assert_eq!(state.rest_days.get(&1), Some(&1));

        // Setting the same direction again is a no-op
        let adjustment =
            PlanningState::map_click_adjustment(&profile, 47.2, 11.0).expect("adjustment");
        state.set_stage_adjustment(0, adjustment);
        state.set_direction(Direction::Reversed);
        assert!(!state.stage_adjustments.is_empty());
    }

    #[test]
    fn test_map_click_adjustment_snaps_to_track() {
        let profile = line_profile();
        let adjustment =
            PlanningState::map_click_adjustment(&profile, 47.203, 11.002).expect("adjustment");

        assert_eq!(adjustment.reason, AdjustmentReason::Map);
        assert_eq!(adjustment.leave_trail_point.track_index, 20);
        assert!((adjustment.end_km - profile.km_at(20)).abs() < 1e-9);
        assert!(adjustment.detour_route.is_none());
    }

    #[test]
    fn test_state_serde_round_trip() {
        let profile = line_profile();
        let mut state = PlanningState::new();
        state.set_plan_mode(PlanMode::Custom);
        state.set_km_range(5.0, 60.0);
        state.add_rest_day(1);
        state.set_start_date(NaiveDate::from_ymd_opt(2026, 6, 1));
        let adjustment =
            PlanningState::map_click_adjustment(&profile, 47.2, 11.0).expect("adjustment");
        state.set_stage_adjustment(0, adjustment);

        let json = serde_json::to_string(&state).unwrap();
        let restored: PlanningState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);

        // The restored state derives the same stages
        assert_eq!(
            derive_stages(&profile, &[], &restored),
            derive_stages(&profile, &[], &state)
        );
    }

    #[test]
    fn test_state_schema_evolution() {
        // A record saved before most fields existed still loads
        let old: PlanningState =
            serde_json::from_str(r#"{"plan_mode": "custom", "target_km_per_day": 18.0}"#).unwrap();
        assert_eq!(old.plan_mode, PlanMode::Custom);
        assert_eq!(old.target_km_per_day, 18.0);
        assert_eq!(old.direction, Direction::Forward);
        assert!(old.rest_days.is_empty());
    }

    #[test]
    fn test_preferences_schema_evolution() {
        let empty = PlannerPreferences::from_json("{}");
        assert_eq!(empty.target_km_per_day, DEFAULT_TARGET_KM_PER_DAY);
        assert!(empty.poi_filter.is_enabled("camping"));

        let partial = PlannerPreferences::from_json(
            r#"{"target_km_per_day": 15.0, "unknown_future_field": true}"#,
        );
        assert_eq!(partial.target_km_per_day, 15.0);

        let broken = PlannerPreferences::from_json("}{ not json");
        assert_eq!(broken, PlannerPreferences::default());
    }

    #[test]
    fn test_poi_filter_gates_search() {
        let coords: Vec<(f64, f64, Option<f64>)> =
            (0..41).map(|i| (47.0 + i as f64 * 0.01, 11.0, None)).collect();
        let campsite = crate::Waypoint {
            lat: 47.09,
            lon: 11.003,
            label: "Camping Alpenblick".to_string(),
            category: Some("camping".to_string()),
            distance_to_track_km: None,
        };
        let profile = TrackProfile::from_coords(&coords, vec![campsite], Direction::Forward)
            .expect("profile");

        let mut state = PlanningState::new();
        assert!(matches!(
            state.find_poi_near(&profile, 10.0, "camping"),
            PoiLookup::Found(_)
        ));

        // Disabling the category hides it from search entirely
        state.poi_filter.enabled_categories.remove("camping");
        assert_eq!(
            state.find_poi_near(&profile, 10.0, "camping"),
            PoiLookup::NoneOfCategory
        );

        // Shrinking the radius turns the same search into out-of-range
        let mut state = PlanningState::new();
        state.poi_filter.max_distance_km = 0.1;
        assert!(matches!(
            state.find_poi_near(&profile, 10.0, "camping"),
            PoiLookup::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_preferences_round_trip() {
        let mut prefs = PlannerPreferences::default();
        prefs.trail_progress.insert(
            "alpine-crossing".to_string(),
            TrailProgress {
                completed_days: 3,
                last_visited: NaiveDate::from_ymd_opt(2026, 7, 14),
            },
        );
        let json = prefs.to_json().unwrap();
        let restored = PlannerPreferences::from_json(&json);
        assert_eq!(restored, prefs);
    }
}
