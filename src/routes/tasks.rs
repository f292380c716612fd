// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scheduler routes for the sync job engine.
//!
//! These endpoints are called by Cloud Scheduler, not directly by users.
//! The router wraps them in [`require_scheduler_auth`].
//!
//! [`require_scheduler_auth`]: crate::middleware::require_scheduler_auth

use crate::error::AppError;
use crate::services::{SweepReport, TickReport};
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// Task handler routes (called by Cloud Scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/sync-tick", post(sync_tick))
        .route("/tasks/sweep-stale-jobs", post(sweep_stale_jobs))
        .route("/tasks/purge-jobs", post(purge_jobs))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u32,
}

/// Claim and run the oldest pending sync jobs.
async fn sync_tick(State(state): State<Arc<AppState>>) -> Result<Json<TickReport>, AppError> {
    let report = state.engine.run_tick().await?;
    Ok(Json(report))
}

/// Reset or fail jobs stuck in `in_progress`.
async fn sweep_stale_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepReport>, AppError> {
    let report = state.engine.sweep_stale().await?;
    Ok(Json(report))
}

/// Delete terminal jobs past retention.
async fn purge_jobs(State(state): State<Arc<AppState>>) -> Result<Json<PurgeResponse>, AppError> {
    let purged = state.engine.purge_expired().await?;
    Ok(Json(PurgeResponse { purged }))
}
