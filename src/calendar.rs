//! # Calendar / Itinerary Builder
//!
//! Expands an ordered stage list plus a start date and a sparse rest-day
//! map into a flat sequence of calendar days. Pure calendar-day arithmetic
//! on [`chrono::NaiveDate`]: no timezones, no clock. Idempotent and
//! side-effect-free, so consumers can rebuild the itinerary on every edit.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::stages::Stage;

/// One calendar day of a planned hike: a walking day or a rest day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItineraryDay {
    Stage {
        /// 0-based index into the stage list.
        stage_index: usize,
        date: NaiveDate,
    },
    Rest {
        /// The stage this rest day follows.
        after_stage_index: usize,
        /// 1-based number within a run of consecutive rest days.
        rest_day_number: u32,
        date: NaiveDate,
    },
}

impl ItineraryDay {
    pub fn date(&self) -> NaiveDate {
        match self {
            ItineraryDay::Stage { date, .. } => *date,
            ItineraryDay::Rest { date, .. } => *date,
        }
    }
}

/// Expand stages and rest days into a dated day sequence.
///
/// The itinerary is opt-in: without a start date the result is empty. Each
/// stage emits one walking day, followed by `rest_days[stage_index]`
/// consecutive rest days; every entry advances the date by one calendar
/// day.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use chrono::NaiveDate;
/// use trail_planner::calendar::build_itinerary;
/// use trail_planner::stages::{OfficialStage, Stage};
///
/// let stages: Vec<Stage> = (1..=2)
///     .map(|ordinal| {
///         Stage::Official(OfficialStage {
///             ordinal,
///             from_label: "A".to_string(),
///             to_label: "B".to_string(),
///             length_km: 20.0,
///         })
///     })
///     .collect();
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1);
/// let days = build_itinerary(start, &stages, &BTreeMap::new());
/// assert_eq!(days.len(), 2);
/// ```
pub fn build_itinerary(
    start_date: Option<NaiveDate>,
    stages: &[Stage],
    rest_days: &BTreeMap<usize, u32>,
) -> Vec<ItineraryDay> {
    let Some(start) = start_date else {
        return Vec::new();
    };

    let mut days = Vec::new();
    let mut date = start;

    for stage_index in 0..stages.len() {
        days.push(ItineraryDay::Stage { stage_index, date });
        let Some(next) = date.succ_opt() else {
            return days;
        };
        date = next;

        let rest_count = rest_days.get(&stage_index).copied().unwrap_or(0);
        for rest_day_number in 1..=rest_count {
            days.push(ItineraryDay::Rest {
                after_stage_index: stage_index,
                rest_day_number,
                date,
            });
            let Some(next) = date.succ_opt() else {
                return days;
            };
            date = next;
        }
    }

    days
}

/// Group itinerary days by `(year, month)` for display.
///
/// The input is already date-ordered, so groups come out in calendar order.
pub fn group_by_month(days: &[ItineraryDay]) -> Vec<((i32, u32), Vec<ItineraryDay>)> {
    let mut groups: Vec<((i32, u32), Vec<ItineraryDay>)> = Vec::new();

    for day in days {
        let key = (day.date().year(), day.date().month());
        match groups.last_mut() {
            Some((last_key, group)) if *last_key == key => group.push(*day),
            _ => groups.push((key, vec![*day])),
        }
    }

    groups
}
