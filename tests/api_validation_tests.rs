// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Job creation input validation tests.

use activity_sync::db::SyncStore;
use activity_sync::models::{Provider, SyncJobStatus, SyncKind};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

async fn post_job(app: &common::TestApp, payload: Value) -> (StatusCode, Value) {
    let token = common::create_test_oidc_jwt(&app.state.config);
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_create_job() {
    let app = common::create_test_app();

    let (status, body) = post_job(
        &app,
        json!({
            "athlete_id": "athlete-1",
            "sync_type": "full",
            "provider": "garmin",
            "after": "2024-01-01T00:00:00Z",
            "before": "2024-06-01T00:00:00Z",
            "metadata": { "max_activities": 20 }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");

    let job_id = body["job_id"].as_str().unwrap();
    let job = app.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.athlete_id, "athlete-1");
    assert_eq!(job.provider, Provider::Garmin);
    assert_eq!(job.sync_type, SyncKind::Full);
    assert_eq!(job.status, SyncJobStatus::Pending);
    assert_eq!(job.metadata.max_activities, Some(20));
    assert_eq!(job.retry_count, 0);
}

#[tokio::test]
async fn test_provider_defaults_to_strava() {
    let app = common::create_test_app();

    let (status, body) = post_job(
        &app,
        json!({ "athlete_id": "athlete-1", "sync_type": "incremental" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let job = app
        .store
        .get_job(body["job_id"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.provider, Provider::Strava);
}

#[tokio::test]
async fn test_blank_athlete_rejected() {
    let app = common::create_test_app();

    let (status, _) = post_job(&app, json!({ "athlete_id": " ", "sync_type": "full" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inverted_window_rejected() {
    let app = common::create_test_app();

    let (status, body) = post_job(
        &app,
        json!({
            "athlete_id": "athlete-1",
            "sync_type": "full",
            "after": "2024-06-01T00:00:00Z",
            "before": "2024-01-01T00:00:00Z"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_max_activities_out_of_range() {
    let app = common::create_test_app();

    for cap in [0, 10_001] {
        let (status, _) = post_job(
            &app,
            json!({
                "athlete_id": "athlete-1",
                "sync_type": "full",
                "metadata": { "max_activities": cap }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "cap {cap}");
    }
}

#[tokio::test]
async fn test_unknown_sync_type_rejected() {
    let app = common::create_test_app();

    let (status, _) = post_job(
        &app,
        json!({ "athlete_id": "athlete-1", "sync_type": "everything" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
