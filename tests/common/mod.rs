// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test harness: an in-process fake Strava and a wired-up app.

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strava_sync::config::Config;
use strava_sync::db::ActivityDb;
use strava_sync::AppState;
use tempfile::TempDir;

/// Scriptable fake of the two Strava endpoints this app talks to.
pub struct FakeStrava {
    /// Status returned for refresh-token grants
    pub refresh_status: StatusCode,
    /// Delay before answering refresh-token grants
    pub refresh_delay: Duration,
    /// Response for authorization-code grants
    pub exchange_response: (StatusCode, Value),
    /// Full remote activity collection, newest first
    pub activities: Vec<Value>,
    /// Page number that answers with HTTP 500
    pub fail_page: Option<u32>,

    // --- Observations ---
    pub refresh_tokens_seen: Vec<String>,
    pub codes_seen: Vec<String>,
    pub bearer_tokens_seen: Vec<String>,
    pub pages_requested: Vec<u32>,
    pub issued: u32,
}

impl Default for FakeStrava {
    fn default() -> Self {
        Self {
            refresh_status: StatusCode::OK,
            refresh_delay: Duration::ZERO,
            exchange_response: (
                StatusCode::OK,
                json!({
                    "token_type": "Bearer",
                    "access_token": "initial-access",
                    "refresh_token": "initial-refresh",
                    "expires_at": 1_900_000_000,
                    "athlete": { "id": 4242, "firstname": "Robin", "lastname": "Doe" }
                }),
            ),
            activities: Vec::new(),
            fail_page: None,
            refresh_tokens_seen: Vec::new(),
            codes_seen: Vec::new(),
            bearer_tokens_seen: Vec::new(),
            pages_requested: Vec::new(),
            issued: 0,
        }
    }
}

pub type SharedFake = Arc<Mutex<FakeStrava>>;

/// A remote activity as Strava's list endpoint would return it.
pub fn remote_activity(id: i64, day: u32) -> Value {
    json!({
        "id": id,
        "name": format!("Activity {}", id),
        "distance": 5000.4 + id as f64,
        "moving_time": 1800,
        "elapsed_time": 1900,
        "type": "Run",
        "sport_type": "Run",
        "total_elevation_gain": 42.0,
        "start_date": format!("2024-05-{:02}T14:00:00Z", day),
        "start_date_local": format!("2024-05-{:02}T07:00:00Z", day),
        "location_city": null,
        "location_state": "California",
        "location_country": "United States"
    })
}

async fn token_endpoint(
    State(fake): State<SharedFake>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let grant = form.get("grant_type").cloned().unwrap_or_default();

    if grant == "authorization_code" {
        return exchange_grant(&fake, &form);
    }

    let delay = fake.lock().unwrap().refresh_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    refresh_grant(&fake, &form)
}

fn exchange_grant(fake: &SharedFake, form: &HashMap<String, String>) -> Response {
    let mut fake = fake.lock().unwrap();
    fake.codes_seen
        .push(form.get("code").cloned().unwrap_or_default());
    let (status, body) = fake.exchange_response.clone();
    (status, Json(body)).into_response()
}

fn refresh_grant(fake: &SharedFake, form: &HashMap<String, String>) -> Response {
    let mut fake = fake.lock().unwrap();
    fake.refresh_tokens_seen
        .push(form.get("refresh_token").cloned().unwrap_or_default());

    if fake.refresh_status != StatusCode::OK {
        let body = json!({
            "message": "Authorization Error",
            "errors": [{ "resource": "RefreshToken", "field": "refresh_token", "code": "invalid" }]
        });
        return (fake.refresh_status, Json(body)).into_response();
    }

    fake.issued += 1;
    let n = fake.issued;
    Json(json!({
        "token_type": "Bearer",
        "access_token": format!("access-{}", n),
        "refresh_token": format!("refresh-{}", n),
        "expires_at": 1_900_000_000,
        "expires_in": 21600
    }))
    .into_response()
}

async fn activities_endpoint(
    State(fake): State<SharedFake>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut fake = fake.lock().unwrap();

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    fake.bearer_tokens_seen.push(bearer);

    let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = query
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(30);
    fake.pages_requested.push(page);

    if fake.fail_page == Some(page) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }

    let start = (page.saturating_sub(1) as usize) * per_page;
    let slice: Vec<Value> = fake
        .activities
        .iter()
        .skip(start)
        .take(per_page)
        .cloned()
        .collect();
    Json(slice).into_response()
}

/// Bind the fake to an ephemeral port and return its base URL.
pub async fn spawn_fake_strava(fake: SharedFake) -> String {
    let app = Router::new()
        .route("/oauth/token", post(token_endpoint))
        .route("/api/v3/athlete/activities", get(activities_endpoint))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Base URL on which nothing is listening.
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub const INITIAL_CREDENTIALS: &str = "# Strava application\n\
STRAVA_CLIENT_ID=test_client_id\n\
STRAVA_CLIENT_SECRET=test_secret\n\
STRAVA_ACCESS_TOKEN=access-0\n\
STRAVA_REFRESH_TOKEN=refresh-0\n\
DATABASE_PATH=activities.db\n";

/// Everything a test needs: temp dir, fake Strava, and app state.
pub struct TestApp {
    pub dir: TempDir,
    pub fake: SharedFake,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn credentials_path(&self) -> PathBuf {
        self.state.config.credentials_path.clone()
    }

    pub fn credentials_file(&self) -> String {
        std::fs::read_to_string(self.credentials_path()).unwrap()
    }

    pub fn router(&self) -> Router {
        strava_sync::routes::create_router(self.state.clone())
    }
}

/// Build an app wired to a fresh fake Strava.
pub async fn test_app(fake: FakeStrava) -> TestApp {
    test_app_with(fake, |_| {}).await
}

/// Build an app, letting the caller adjust config before services are wired.
pub async fn test_app_with(fake: FakeStrava, tweak: impl FnOnce(&mut Config)) -> TestApp {
    let fake = Arc::new(Mutex::new(fake));
    let base_url = spawn_fake_strava(fake.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let credentials_path = dir.path().join(".env");
    std::fs::write(&credentials_path, INITIAL_CREDENTIALS).unwrap();

    let mut config = Config::test_default();
    config.credentials_path = credentials_path;
    config.strava_api_url = format!("{}/api/v3", base_url);
    config.strava_oauth_url = format!("{}/oauth", base_url);
    config.strava_access_token = Some("access-0".to_string());
    config.strava_refresh_token = Some("refresh-0".to_string());
    tweak(&mut config);

    let db = ActivityDb::open_in_memory().unwrap();
    let state = Arc::new(AppState::new(config, db).unwrap());

    TestApp { dir, fake, state }
}
