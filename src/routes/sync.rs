// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Manual sync trigger.

use axum::{extract::State, routing::get, Router};
use std::sync::Arc;

use crate::error::Result;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/sync_activities", get(sync_activities).post(sync_activities))
}

/// Run one sync and report how many activities were new.
async fn sync_activities(State(state): State<Arc<AppState>>) -> Result<String> {
    let report = state.sync_service.fetch_and_merge().await?;

    Ok(match report.added {
        1 => "Synced 1 new activity".to_string(),
        n => format!("Synced {} new activities", n),
    })
}
