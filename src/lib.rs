// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava-Sync: mirror Strava activities into a local SQLite store.
//!
//! This crate provides the OAuth credential lifecycle, the pull-based sync
//! that reconciles remote activities against the local store, and a small
//! HTTP API over the synced data.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::ActivityDb;
use services::{CredentialManager, SyncService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: ActivityDb,
    pub credentials: Arc<CredentialManager>,
    pub sync_service: SyncService,
}

impl AppState {
    /// Wire services together from configuration and an open database.
    pub fn new(config: Config, db: ActivityDb) -> error::Result<Self> {
        let credentials = Arc::new(CredentialManager::from_config(&config)?);
        let sync_service = SyncService::new(
            db.clone(),
            Arc::clone(&credentials),
            config.sync_page_size,
            config.sync_max_pages,
        );
        Ok(Self {
            config,
            db,
            credentials,
            sync_service,
        })
    }
}
