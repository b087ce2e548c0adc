// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// None of these are retried internally; each one ends the operation that
/// raised it.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Token endpoint rejected the refresh or could not be reached.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Authorization code exchange was rejected or incomplete.
    #[error("Authorization failed: {0}")]
    AuthorizationExchange(String),

    /// Sync aborted; nothing from this invocation was stored.
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Credential file could not be written.
    #[error("Failed to persist credentials: {0}")]
    CredentialPersistence(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short machine-readable kind used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::TokenRefresh(_) => "token_refresh_error",
            AppError::AuthorizationExchange(_) => "authorization_error",
            AppError::Sync(_) => "sync_error",
            AppError::CredentialPersistence(_) => "credential_persistence_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(e: crate::db::DbError) -> Self {
        AppError::Database(e.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AppError::TokenRefresh(_) | AppError::Sync(_) => {
                tracing::warn!(error = %self, "Upstream operation failed");
                (StatusCode::BAD_GATEWAY, Some(self.to_string()))
            }
            AppError::AuthorizationExchange(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, Some(self.to_string()))
            }
            AppError::CredentialPersistence(_) => {
                tracing::error!(error = %self, "Credential persistence error");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(self.to_string()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: self.kind().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type Result<T> = std::result::Result<T, AppError>;
