// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::strava::StravaActivitySummary;

/// Stored activity record.
///
/// Created once on first sighting of a remote id and never updated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity ID (also the primary key)
    pub id: i64,
    /// Activity name/title
    pub name: String,
    /// Free-text description (empty if Strava had none)
    pub description: String,
    /// Distance in meters
    pub distance: i64,
    /// Moving time in seconds
    pub moving_time: i64,
    /// Activity type (Ride, Run, Hike, etc.)
    #[serde(rename = "type")]
    pub activity_type: String,
    /// Elevation gain in meters
    pub total_elevation_gain: i64,
    /// Start time in the athlete's local time zone
    pub start_date_local: DateTime<Utc>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// Device name (e.g. "Garmin Edge 530")
    pub device_name: Option<String>,
}

impl From<StravaActivitySummary> for Activity {
    fn from(remote: StravaActivitySummary) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            description: remote.description.unwrap_or_default(),
            distance: remote.distance,
            moving_time: remote.moving_time,
            activity_type: remote.activity_type,
            total_elevation_gain: remote.total_elevation_gain.unwrap_or(0),
            start_date_local: remote.start_date_local,
            city: remote.city,
            state: remote.state,
            country: remote.country,
            device_name: remote.device_name,
        }
    }
}
