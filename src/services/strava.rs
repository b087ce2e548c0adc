// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - Refresh-token and authorization-code exchanges against `/oauth/token`
//! - Paginated activity listing
//! - Building the user-facing authorization URL

use crate::config::Config;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_url: String,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    ///
    /// Every request made by this client is bounded by `config.http_timeout`.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.strava_api_url.trim_end_matches('/').to_string(),
            oauth_url: config.strava_oauth_url.trim_end_matches('/').to_string(),
            client_id: config.strava_client_id.clone(),
            client_secret: config.strava_client_secret.clone(),
        })
    }

    fn token_url(&self) -> String {
        format!("{}/token", self.oauth_url)
    }

    /// URL the user visits to grant this application access.
    pub fn authorize_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}/authorize?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             approval_prompt=auto&\
             scope=read,activity:read_all",
            self.oauth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
        )
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// Anything other than HTTP 200 with both tokens in the body is a
    /// [`AppError::TokenRefresh`] carrying the raw response body.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TokenRefresh(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::TokenRefresh(describe_transport_error(&e)))?;

        if status != StatusCode::OK {
            tracing::warn!(status = %status, "Strava rejected token refresh");
            return Err(AppError::TokenRefresh(format!("HTTP {}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::TokenRefresh(format!("Malformed token response ({}): {}", e, body)))
    }

    /// Exchange a one-time authorization code for the initial token pair.
    ///
    /// Success requires a 2xx JSON body with `access_token` and
    /// `refresh_token` and no `errors` key; otherwise the remote `message`
    /// (or raw body) is reported.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::AuthorizationExchange(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::AuthorizationExchange(describe_transport_error(&e)))?;

        parse_exchange_response(status, &body)
    }

    /// List one page of the athlete's activities, most recent first.
    ///
    /// Records are returned undecoded so the caller can attribute a decode
    /// failure to a specific record.
    pub async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let url = format!("{}/athlete/activities", self.api_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Sync(describe_transport_error(&e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!("Strava rate limit hit (429)");
            }

            return Err(AppError::Sync(format!(
                "Activity listing failed with HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Sync(format!("Activity listing is not a JSON array: {}", e)))
    }
}

/// Validate an authorization-code exchange response.
fn parse_exchange_response(
    status: StatusCode,
    body: &str,
) -> Result<TokenExchangeResponse, AppError> {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();

    let remote_message = || {
        json.as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string())
    };

    let has_errors = json.as_ref().is_some_and(|v| v.get("errors").is_some());
    let has_access_token = json
        .as_ref()
        .and_then(|v| v.get("access_token"))
        .is_some_and(|t| t.is_string());

    if !status.is_success() || has_errors || !has_access_token {
        tracing::error!(status = %status, "Strava token exchange failed");
        return Err(AppError::AuthorizationExchange(remote_message()));
    }

    serde_json::from_str(body).map_err(|e| {
        AppError::AuthorizationExchange(format!("Incomplete token response: {}", e))
    })
}

/// Describe a reqwest failure, calling out timeouts explicitly.
fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        format!("request failed: {}", e)
    }
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Token exchange response from Strava OAuth (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub athlete: Option<StravaAthlete>,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

impl StravaAthlete {
    /// "First Last", or whichever part Strava returned.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.firstname.as_deref(), self.lastname.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// Summary activity as returned by the list endpoint.
///
/// Optional fields are resolved here, once, with their declared defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivitySummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "rounded_meters")]
    pub distance: i64,
    pub moving_time: i64,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, deserialize_with = "optional_rounded_meters")]
    pub total_elevation_gain: Option<i64>,
    pub start_date_local: DateTime<Utc>,
    #[serde(default, alias = "location_city")]
    pub city: Option<String>,
    #[serde(default, alias = "location_state")]
    pub state: Option<String>,
    #[serde(default, alias = "location_country")]
    pub country: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
}

/// Strava reports meters as floats; store whole meters.
fn rounded_meters<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let meters = f64::deserialize(deserializer)?;
    if !meters.is_finite() {
        return Err(serde::de::Error::custom("distance is not a finite number"));
    }
    Ok(meters.round() as i64)
}

fn optional_rounded_meters<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        Some(meters) if meters.is_finite() => Ok(Some(meters.round() as i64)),
        Some(_) => Err(serde::de::Error::custom(
            "elevation gain is not a finite number",
        )),
        None => Ok(None),
    }
}
