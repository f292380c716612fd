// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Job creation route.
//!
//! Internal surface: the router wraps it in service OIDC auth.

use crate::error::AppError;
use crate::models::{JobMetadata, Provider, SyncJob, SyncJobStatus, SyncKind};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/jobs", post(create_job))
}

/// Body of `POST /jobs`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_request"))]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 128))]
    pub athlete_id: String,
    pub sync_type: SyncKind,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub metadata: Option<JobMetadataRequest>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct JobMetadataRequest {
    #[validate(range(min = 1, max = 10000))]
    pub max_activities: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn validate_request(request: &CreateJobRequest) -> Result<(), ValidationError> {
    if request.athlete_id.trim().is_empty() {
        return Err(ValidationError::new("blank_athlete_id")
            .with_message("athlete_id must not be blank".into()));
    }
    if let (Some(after), Some(before)) = (request.after, request.before) {
        if after >= before {
            return Err(ValidationError::new("empty_window")
                .with_message("after must be earlier than before".into()));
        }
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: SyncJobStatus,
}

/// Queue a new sync job.
async fn create_job(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateJobResponse>), AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let metadata = request
        .metadata
        .map(|m| JobMetadata {
            max_activities: m.max_activities,
            extra: m.extra,
        })
        .unwrap_or_default();

    let job = SyncJob::new(
        request.athlete_id.trim(),
        request.provider.unwrap_or_default(),
        request.sync_type,
        request.after,
        request.before,
        metadata,
    );
    let job = state.engine.enqueue(job).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}
