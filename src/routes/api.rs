// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-only API over synced activities.

use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityStats, MonthlyStats};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/activities", get(get_activities))
        .route("/api/activities/{id}", get(get_activity))
        .route("/api/stats", get(get_stats))
        .route("/api/stats/monthly", get(get_monthly_stats))
}

// ─── Activities ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    /// Pagination: page number (1-indexed)
    #[serde(default = "default_page")]
    page: u32,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    30
}

const MAX_PER_PAGE: u32 = 200;

#[derive(Serialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<Activity>,
    pub page: u32,
    pub per_page: u32,
    /// Total number of stored activities
    pub total: u64,
}

/// List stored activities, newest first.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    if params.page < 1 {
        return Err(AppError::BadRequest(
            "Page must be greater than 0".to_string(),
        ));
    }
    if !(1..=MAX_PER_PAGE).contains(&params.per_page) {
        return Err(AppError::BadRequest(format!(
            "per_page must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }

    let limit = params.per_page;
    let offset = u64::from(params.page - 1) * u64::from(limit);

    tracing::debug!(page = params.page, per_page = limit, "Fetching activities");

    let activities = state.db.list_activities(limit, offset).await?;
    let total = state.db.count_activities().await?;

    Ok(Json(ActivitiesResponse {
        activities,
        page: params.page,
        per_page: limit,
        total,
    }))
}

/// Get one stored activity.
async fn get_activity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Activity>> {
    state
        .db
        .get_activity(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Activity {} not found", id)))
}

// ─── Stats ───────────────────────────────────────────────────

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<ActivityStats>> {
    let activities = state.db.all_activities().await?;
    Ok(Json(ActivityStats::from_activities(&activities)))
}

async fn get_monthly_stats(State(state): State<Arc<AppState>>) -> Result<Json<MonthlyStats>> {
    let activities = state.db.all_activities().await?;
    Ok(Json(MonthlyStats::from_activities(&activities)))
}
