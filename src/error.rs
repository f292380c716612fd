// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures raised while talking to providers or the datastore during sync.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// Provider rejected the access token (401/403). Needs user re-auth.
    #[error("Provider authentication failed: {0}")]
    Auth(String),

    /// The refresh token itself was rejected.
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    /// Transport-level failure (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Network(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Provider payload lacks a field required to identify the activity.
    #[error("Invalid activity payload: {0}")]
    InvalidPayload(String),

    /// No live credential for the athlete on this provider.
    #[error("Athlete {0} is not connected")]
    NotConnected(String),

    /// Token encryption or decryption failed.
    #[error("Token encryption error: {0}")]
    Crypto(String),

    /// No client is registered for the requested provider.
    #[error("Provider {0} is not configured")]
    Unconfigured(String),
}

impl SyncError {
    /// Errors that end the whole job with no partial credit.
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_)
                | SyncError::Refresh(_)
                | SyncError::RateLimited
                | SyncError::NotConnected(_)
                | SyncError::Crypto(_)
                | SyncError::Unconfigured(_)
        )
    }

    /// Errors worth re-queuing the job for (transient infrastructure).
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True if the provider no longer accepts this athlete's tokens.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_) | SyncError::Refresh(_) | SyncError::NotConnected(_)
        )
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Provider API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Persistence(msg) => AppError::Database(msg),
            SyncError::NotConnected(athlete) => {
                AppError::NotFound(format!("Credential for athlete {}", athlete))
            }
            SyncError::InvalidPayload(msg) => AppError::ProviderApi(msg),
            other => AppError::ProviderApi(other.to_string()),
        }
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
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::ProviderApi(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
