// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (`FIRESTORE_EMULATOR_HOST`); they skip themselves otherwise.
//!
//! The emulator provides a clean state for each test run.

use activity_sync::db::{FirestoreDb, SyncStore};
use activity_sync::error::SyncError;
use activity_sync::models::{
    ActivitySource, DisciplineLookup, JobMetadata, JobTransition, OAuthCredential, Provider,
    SyncJob, SyncJobStatus, SyncKind,
};
use activity_sync::services::normalize::normalize;
use chrono::{Duration, TimeZone, Utc};

mod common;
use common::test_db;

/// Generate a unique athlete ID for test isolation.
fn unique_athlete_id() -> String {
    format!("athlete-{}", uuid::Uuid::new_v4())
}

fn credential(athlete_id: &str, provider_athlete_id: &str) -> OAuthCredential {
    OAuthCredential {
        athlete_id: athlete_id.to_string(),
        provider: Provider::Strava,
        provider_athlete_id: provider_athlete_id.to_string(),
        access_token_encrypted: "enc-access".to_string(),
        refresh_token_encrypted: "enc-refresh".to_string(),
        expires_at: Utc::now() + Duration::hours(6),
        connected: true,
        scopes: vec!["activity:read_all".to_string()],
        updated_at: Utc::now(),
    }
}

fn job(athlete_id: &str) -> SyncJob {
    SyncJob::new(
        athlete_id,
        Provider::Strava,
        SyncKind::Full,
        None,
        None,
        JobMetadata::default(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// OFFLINE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_offline_store_reports_persistence_error() {
    let db = FirestoreDb::new_mock();

    let err = db.get_job("anything").await.unwrap_err();
    assert!(matches!(err, SyncError::Persistence(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// CREDENTIAL TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_credential_roundtrip_and_clear() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();
    let provider_athlete_id = uuid::Uuid::new_v4().to_string();

    assert!(db
        .get_credential(Provider::Strava, &athlete_id)
        .await
        .unwrap()
        .is_none());

    db.save_credential(&credential(&athlete_id, &provider_athlete_id))
        .await
        .unwrap();

    let found = db
        .find_credential_by_provider_athlete(Provider::Strava, &provider_athlete_id)
        .await
        .unwrap()
        .expect("credential should be found by provider athlete ID");
    assert_eq!(found.athlete_id, athlete_id);
    assert!(found.connected);

    assert!(db
        .clear_credential(Provider::Strava, &athlete_id)
        .await
        .unwrap());
    let cleared = db
        .get_credential(Provider::Strava, &athlete_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!cleared.connected);
    assert!(cleared.access_token_encrypted.is_empty());

    assert!(!db
        .clear_credential(Provider::Strava, &unique_athlete_id())
        .await
        .unwrap());
}

// ═══════════════════════════════════════════════════════════════════════════
// ACTIVITY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_activity_queries() {
    require_emulator!();

    let db = test_db().await;
    let athlete_id = unique_athlete_id();
    let lookup = DisciplineLookup::default();

    for (id, start) in [
        (9_000_001u64, "2024-05-01T09:00:00Z"),
        (9_000_002, "2024-05-01T12:00:00Z"),
    ] {
        let activity = normalize(
            Provider::Strava,
            common::strava_activity(id, start, 5000.0, 1800),
            &athlete_id,
            &lookup,
        )
        .unwrap();
        db.upsert_activity(&activity).await.unwrap();
    }

    let found = db
        .find_activity_by_source(&athlete_id, ActivitySource::Strava, "9000001")
        .await
        .unwrap()
        .expect("activity should be found by source key");
    assert_eq!(found.id, "strava:9000001");
    assert_eq!(found.distance_meters, Some(5000.0));

    let window = db
        .activities_in_window(
            &athlete_id,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 58, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 2, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(window.len(), 1);

    let latest = db
        .latest_start_time(&athlete_id, ActivitySource::Strava)
        .await
        .unwrap();
    assert_eq!(
        latest,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    );
    assert_eq!(
        db.latest_start_time(&athlete_id, ActivitySource::Garmin)
            .await
            .unwrap(),
        None
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// SYNC JOB TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_job_claim_is_exclusive() {
    require_emulator!();

    let db = test_db().await;
    let job = job(&unique_athlete_id());
    db.create_job(&job).await.unwrap();

    let claim = JobTransition::Claim { now: Utc::now() };
    let (first, second) = tokio::join!(
        db.transition_job(&job.id, &claim),
        db.transition_job(&job.id, &claim)
    );
    let winners = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(winners, 1);

    let stored = db.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncJobStatus::InProgress);
    assert!(stored.started_at.is_some());
}

#[tokio::test]
async fn test_stale_jobs_listed_and_recovered() {
    require_emulator!();

    let db = test_db().await;
    let job = job(&unique_athlete_id());
    db.create_job(&job).await.unwrap();
    let started = Utc::now() - Duration::minutes(45);
    db.transition_job(&job.id, &JobTransition::Claim { now: started })
        .await
        .unwrap()
        .unwrap();

    let cutoff = Utc::now() - Duration::minutes(30);
    let stale = db.list_stale_jobs(cutoff).await.unwrap();
    assert!(stale.iter().any(|j| j.id == job.id));

    let recovered = db
        .transition_job(
            &job.id,
            &JobTransition::RecoverStale {
                cutoff,
                max_retries: 3,
                now: Utc::now(),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered.status, SyncJobStatus::Pending);
    assert_eq!(recovered.retry_count, 1);
}

#[tokio::test]
async fn test_purge_terminal_jobs() {
    require_emulator!();

    let db = test_db().await;
    let mut old = job(&unique_athlete_id());
    old.status = SyncJobStatus::Completed;
    old.completed_at = Some(Utc::now() - Duration::days(40));
    db.create_job(&old).await.unwrap();

    let purged = db
        .purge_terminal_jobs(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert!(purged >= 1);
    assert!(db.get_job(&old.id).await.unwrap().is_none());
}
