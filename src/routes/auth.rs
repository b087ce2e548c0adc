// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth authorization routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/authorize", get(authorize))
        .route("/exchange_token", get(exchange_token))
}

/// Start OAuth flow - redirect to Strava authorization.
async fn authorize(State(state): State<Arc<AppState>>) -> Redirect {
    let url = state.credentials.authorize_url(&state.config.redirect_uri);

    tracing::info!(
        redirect_uri = %state.config.redirect_uri,
        "Starting OAuth flow, redirecting to Strava"
    );

    Redirect::temporary(&url)
}

/// Query parameters Strava appends to the redirect.
#[derive(Deserialize)]
pub struct ExchangeParams {
    #[serde(default)]
    code: Option<String>,
    /// Set when the user declined access
    #[serde(default)]
    error: Option<String>,
    /// Scopes actually granted
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth redirect target - exchange the code for the initial token pair.
async fn exchange_token(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExchangeParams>,
) -> Result<String> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        return Err(AppError::AuthorizationExchange(format!(
            "Strava authorization was not granted: {}",
            error
        )));
    }

    let code = params
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("missing 'code' parameter".to_string()))?;

    tracing::info!(scope = ?params.scope, "Received authorization code");

    let result = state.credentials.exchange_authorization_code(&code).await?;

    Ok(match result.athlete_name {
        Some(name) => format!(
            "Authorized as {}. Tokens saved; visit /sync_activities to import activities.",
            name
        ),
        None => "Authorization successful. Tokens saved.".to_string(),
    })
}
