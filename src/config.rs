// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The credential file doubles as the dotenv file: it is loaded into the
//! process environment at startup, and the credential manager rewrites the
//! token lines in it on every rotation.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Largest page Strava accepts for `/athlete/activities`.
pub const MAX_SYNC_PAGE_SIZE: u32 = 200;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Client identity (never mutated) ---
    /// Strava OAuth client ID
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,

    // --- Token pair as last persisted ---
    pub strava_access_token: Option<String>,
    pub strava_refresh_token: Option<String>,

    // --- Storage ---
    /// Flat `KEY=value` file holding the token pair
    pub credentials_path: PathBuf,
    /// SQLite database holding synced activities
    pub database_path: PathBuf,

    // --- Remote endpoints ---
    /// Strava REST API base (activities)
    pub strava_api_url: String,
    /// Strava OAuth base (`/token`, `/authorize`)
    pub strava_oauth_url: String,
    /// Where Strava sends the user back with the authorization code
    pub redirect_uri: String,
    /// Bound on every outbound HTTP call
    pub http_timeout: Duration,

    // --- Sync ---
    /// Activities requested per remote page
    pub sync_page_size: u32,
    /// Upper bound on pages fetched per sync invocation
    pub sync_max_pages: u32,

    /// Server port
    pub port: u16,
}

impl Config {
    /// Deterministic config for tests; all paths and URLs must be overridden
    /// by the caller before they are used.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            strava_access_token: None,
            strava_refresh_token: None,
            credentials_path: PathBuf::from(".env.test"),
            database_path: PathBuf::from(":memory:"),
            strava_api_url: "http://127.0.0.1:9/api/v3".to_string(),
            strava_oauth_url: "http://127.0.0.1:9/oauth".to_string(),
            redirect_uri: "http://localhost:8080/exchange_token".to_string(),
            http_timeout: Duration::from_secs(5),
            sync_page_size: MAX_SYNC_PAGE_SIZE,
            sync_max_pages: 10,
            port: 8080,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// The credential file (if present) is loaded first so that tokens
    /// persisted by a previous run are picked up.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials_path = PathBuf::from(
            env::var("STRAVA_CREDENTIALS_FILE").unwrap_or_else(|_| ".env".to_string()),
        );
        dotenvy::from_path(&credentials_path).ok(); // Load credential file if present

        let port = parse_or("PORT", 8080u16)?;
        let timeout_secs = parse_or("STRAVA_HTTP_TIMEOUT_SECS", 30u64)?;
        let sync_page_size = parse_or("SYNC_PAGE_SIZE", MAX_SYNC_PAGE_SIZE)?;
        let sync_max_pages = parse_or("SYNC_MAX_PAGES", 10u32)?;

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            strava_access_token: optional("STRAVA_ACCESS_TOKEN"),
            strava_refresh_token: optional("STRAVA_REFRESH_TOKEN"),
            credentials_path,
            database_path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "activities.db".to_string()),
            ),
            strava_api_url: env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| "https://www.strava.com/api/v3".to_string()),
            strava_oauth_url: env::var("STRAVA_OAUTH_URL")
                .unwrap_or_else(|_| "https://www.strava.com/oauth".to_string()),
            redirect_uri: env::var("STRAVA_REDIRECT_URI")
                .unwrap_or_else(|_| format!("http://localhost:{}/exchange_token", port)),
            http_timeout: Duration::from_secs(timeout_secs),
            sync_page_size: sync_page_size.clamp(1, MAX_SYNC_PAGE_SIZE),
            sync_max_pages: sync_max_pages.max(1),
            port,
        })
    }
}

/// Read an optional variable, treating empty values as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
