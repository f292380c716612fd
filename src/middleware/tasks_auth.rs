// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Service-to-service authentication middleware.
//!
//! `/tasks/*` is only callable by Cloud Scheduler; `/jobs` by any holder of
//! the internal service account's ID token.

use crate::services::google_oidc::OidcError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Header Cloud Scheduler sets on every HTTP target invocation.
pub const SCHEDULER_HEADER: &str = "x-cloudscheduler";

/// Require the scheduler header plus a valid OIDC token for `/tasks/*`.
pub async fn require_scheduler_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let scheduler_header = request.headers().get(SCHEDULER_HEADER);
    let from_scheduler = scheduler_header
        .and_then(|h| h.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));

    if !from_scheduler {
        tracing::warn!(
            header = ?scheduler_header,
            "Blocked tasks request without scheduler header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    verify(&state, request.headers()).await?;
    Ok(next.run(request).await)
}

/// Require a valid OIDC token for the internal service account.
pub async fn require_service_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    verify(&state, request.headers()).await?;
    Ok(next.run(request).await)
}

async fn verify(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let principal = state
        .oidc_verifier
        .verify_service_token(headers.get(header::AUTHORIZATION))
        .await
        .map_err(|err| match err {
            OidcError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "Blocked internal request: invalid OIDC token");
                StatusCode::FORBIDDEN
            }
            OidcError::Transient(reason) => {
                tracing::error!(reason = %reason, "OIDC verification transient failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    tracing::debug!(
        email = %principal.email,
        subject = %principal.subject,
        "OIDC verification succeeded"
    );
    Ok(())
}
