// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for provider push notifications.
//!
//! Providers retry aggressively on anything but a 200, so processing errors
//! are logged and acknowledged. The exceptions are malformed payloads (400),
//! foreign subscriptions (403) and failed deauthorizations (500): leaving
//! tokens live after the athlete revoked access is worse than a retry.

use crate::services::garmin::GarminPing;
use crate::services::webhook::{EventKind, StravaEvent};
use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Acknowledgment body Strava expects.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook/strava", get(verify).post(handle_strava_event))
        .route("/webhook/garmin", post(handle_garmin_ping))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
}

/// Verification response.
#[derive(Serialize, Default)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET). Never touches the datastore.
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let token_matches = params.verify_token.as_deref().is_some_and(|token| {
        bool::from(
            token
                .as_bytes()
                .ct_eq(state.config.webhook_verify_token.as_bytes()),
        )
    });

    match (params.mode.as_deref(), params.challenge) {
        (Some("subscribe"), Some(challenge)) if token_matches => {
            tracing::info!("Webhook subscription verified");
            (StatusCode::OK, Json(VerifyResponse { challenge }))
        }
        (mode, _) => {
            tracing::warn!(
                mode = ?mode,
                "Webhook verification failed: invalid token"
            );
            (StatusCode::FORBIDDEN, Json(VerifyResponse::default()))
        }
    }
}

/// Handle incoming Strava events (POST).
async fn handle_strava_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, &'static str) {
    let event: StravaEvent = match serde_json::from_value(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed Strava webhook event");
            return (StatusCode::BAD_REQUEST, "INVALID_EVENT");
        }
    };

    if let Some(expected) = state.config.strava_subscription_id {
        if event.subscription_id != Some(expected) {
            tracing::warn!(
                received_id = ?event.subscription_id,
                expected_id = expected,
                "Security Alert: Webhook subscription ID mismatch"
            );
            return (StatusCode::FORBIDDEN, "FORBIDDEN");
        }
    }

    let is_deauthorization = event.kind() == EventKind::Deauthorize;
    let budget = state.config.webhook_budget;

    match tokio::time::timeout(budget, state.webhooks.handle_strava(&event)).await {
        Ok(Ok(outcome)) => {
            tracing::debug!(object_id = event.object_id, ?outcome, "Webhook event handled");
            (StatusCode::OK, EVENT_RECEIVED)
        }
        Ok(Err(e)) if is_deauthorization => {
            tracing::error!(
                owner_id = event.owner_id,
                error = %e,
                "Failed to process deauthorization"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "DEAUTHORIZATION_FAILED")
        }
        Ok(Err(e)) => {
            tracing::error!(
                object_id = event.object_id,
                owner_id = event.owner_id,
                aspect_type = %event.aspect_type,
                needs_reauth = e.is_token_error(),
                error = %e,
                "Failed to process webhook event"
            );
            (StatusCode::OK, EVENT_RECEIVED)
        }
        Err(_) if is_deauthorization => {
            tracing::error!(
                owner_id = event.owner_id,
                budget_ms = budget.as_millis() as u64,
                "Deauthorization timed out"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "DEAUTHORIZATION_FAILED")
        }
        Err(_) => {
            tracing::error!(
                object_id = event.object_id,
                owner_id = event.owner_id,
                budget_ms = budget.as_millis() as u64,
                "Webhook event processing timed out"
            );
            (StatusCode::OK, EVENT_RECEIVED)
        }
    }
}

/// Handle Garmin ping notifications (POST).
async fn handle_garmin_ping(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let ping: GarminPing = match serde_json::from_value(payload) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed Garmin ping");
            return StatusCode::BAD_REQUEST;
        }
    };

    let has_deregistrations = !ping.deregistrations.is_empty();
    let budget = state.config.webhook_budget;

    match tokio::time::timeout(budget, state.webhooks.handle_garmin(ping)).await {
        Ok(Ok(_)) => StatusCode::OK,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to process Garmin deregistration");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(_) if has_deregistrations => {
            tracing::error!(
                budget_ms = budget.as_millis() as u64,
                "Garmin ping with deregistrations timed out"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(_) => {
            tracing::error!(
                budget_ms = budget.as_millis() as u64,
                "Garmin ping processing timed out"
            );
            StatusCode::OK
        }
    }
}
