//! Aggregate statistics over stored activities.
//!
//! These are plain reducers over the local store; they are recomputed on
//! every request and never persisted.

use chrono::Datelike;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::Activity;

/// All-time totals for the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityStats {
    // ─── Activity Totals ─────────────────────────────────────────
    pub total_activities: u32,
    /// Meters
    pub total_distance: i64,
    /// Seconds
    pub total_moving_time: i64,
    /// Meters
    pub total_elevation_gain: i64,

    // ─── By Type ─────────────────────────────────────────────────
    /// Activity count per type (for pie charts)
    pub activities_by_type: HashMap<String, u32>,
    /// Total distance per type (meters)
    pub distance_by_type: HashMap<String, i64>,

    /// Activity with the greatest distance
    pub longest_activity_id: Option<i64>,
    #[serde(skip)]
    longest_distance: i64,

    // ─── Idempotency ─────────────────────────────────────────────
    #[serde(skip)]
    seen_ids: HashSet<i64>,
}

impl ActivityStats {
    /// Reduce a collection of activities into totals.
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut stats = Self::default();
        for activity in activities {
            stats.update_from_activity(activity);
        }
        stats
    }

    /// Fold one activity into the totals.
    ///
    /// Returns `false` if the activity was already counted.
    pub fn update_from_activity(&mut self, activity: &Activity) -> bool {
        if !self.seen_ids.insert(activity.id) {
            return false;
        }

        self.total_activities += 1;
        self.total_distance += activity.distance;
        self.total_moving_time += activity.moving_time;
        self.total_elevation_gain += activity.total_elevation_gain;

        *self
            .activities_by_type
            .entry(activity.activity_type.clone())
            .or_insert(0) += 1;
        *self
            .distance_by_type
            .entry(activity.activity_type.clone())
            .or_insert(0) += activity.distance;

        if self.longest_activity_id.is_none() || activity.distance > self.longest_distance {
            self.longest_activity_id = Some(activity.id);
            self.longest_distance = activity.distance;
        }

        true
    }
}

/// One calendar month of activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthBucket {
    pub activities: u32,
    pub distance: i64,
    pub moving_time: i64,
}

/// Per-month rollup keyed by "YYYY-MM" (sorted ascending).
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonthlyStats {
    pub months: BTreeMap<String, MonthBucket>,
}

impl MonthlyStats {
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut months: BTreeMap<String, MonthBucket> = BTreeMap::new();
        for activity in activities {
            let bucket = months.entry(month_key(activity)).or_default();
            bucket.activities += 1;
            bucket.distance += activity.distance;
            bucket.moving_time += activity.moving_time;
        }
        Self { months }
    }
}

/// "YYYY-MM" of the activity's local start date.
fn month_key(activity: &Activity) -> String {
    let date = activity.start_date_local;
    format!("{:04}-{:02}", date.year(), date.month())
}
