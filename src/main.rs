// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava-Sync API Server
//!
//! Completes the Strava OAuth flow, syncs activities on demand, and serves
//! list, detail, and statistics views over the local store.

use std::sync::Arc;
use strava_sync::{config::Config, db::ActivityDb, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment (and the credential file)
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        credentials = %config.credentials_path.display(),
        has_refresh_token = config.strava_refresh_token.is_some(),
        "Starting Strava-Sync API"
    );

    let db = ActivityDb::open(&config.database_path).await?;

    let state = Arc::new(AppState::new(config.clone(), db)?);

    // Build router
    let app = strava_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strava_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;
    Ok(())
}
