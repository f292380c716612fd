// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cross-provider duplicate detection on normalized provider payloads.

use activity_sync::models::{DisciplineLookup, Provider};
use activity_sync::services::normalize::normalize;
use activity_sync::services::reconcile::{merge, reconcile, ReconcileAction};
use chrono::{DateTime, Utc};
use serde_json::json;

mod common;

// 2024-05-01T09:00:00Z
const NINE_AM: i64 = 1714554000;

fn strava_row(distance: f64, elapsed: u32) -> activity_sync::models::Activity {
    normalize(
        Provider::Strava,
        common::strava_activity(42, "2024-05-01T09:00:00Z", distance, elapsed),
        "athlete-1",
        &DisciplineLookup::default(),
    )
    .unwrap()
}

fn garmin_candidate(
    offset_secs: i64,
    distance: f64,
    duration: u32,
) -> activity_sync::models::Activity {
    normalize(
        Provider::Garmin,
        common::garmin_activity(
            777,
            "garmin-user",
            NINE_AM + offset_secs,
            distance,
            duration,
            148.0,
        ),
        "athlete-1",
        &DisciplineLookup::default(),
    )
    .unwrap()
}

#[test]
fn test_watch_and_phone_run_merge() {
    let mut existing = strava_row(5000.0, 1800);
    let candidate = garmin_candidate(45, 5050.0, 1790);

    let action = reconcile(&candidate, std::slice::from_ref(&existing));
    assert_eq!(action, ReconcileAction::MergeInto("strava:42".to_string()));

    let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    merge(&mut existing, &candidate, now);

    assert_eq!(existing.id, "strava:42");
    assert_eq!(existing.distance_meters, Some(5000.0));
    assert_eq!(existing.elapsed_time_secs, Some(1800));
    assert_eq!(existing.average_heartrate, Some(148.0));
    assert_eq!(existing.device_name.as_deref(), Some("Forerunner 965"));
    assert_eq!(existing.updated_at, now);
    assert_eq!(existing.merged_reports.len(), 1);
    assert_eq!(existing.merged_reports[0].raw_payload["activityId"], 777);
}

#[test]
fn test_within_tolerances_always_merges() {
    let existing = strava_row(5000.0, 1800);

    for offset in [-120, -60, 0, 59, 120] {
        for distance in [4900.0, 5000.0, 5100.0] {
            for duration in [1740, 1800, 1860] {
                let candidate = garmin_candidate(offset, distance, duration);
                assert_eq!(
                    reconcile(&candidate, std::slice::from_ref(&existing)),
                    ReconcileAction::MergeInto(existing.id.clone()),
                    "offset {offset}s, {distance}m, {duration}s"
                );
            }
        }
    }
}

#[test]
fn test_outside_time_window_inserts() {
    let existing = strava_row(5000.0, 1800);

    for offset in [-3600, -121, 121, 600] {
        let candidate = garmin_candidate(offset, 5000.0, 1800);
        assert_eq!(
            reconcile(&candidate, std::slice::from_ref(&existing)),
            ReconcileAction::Insert,
            "offset {offset}s"
        );
    }
}

#[test]
fn test_different_workout_same_start_inserts() {
    let existing = strava_row(5000.0, 1800);

    // Same start, but a 10k instead of a 5k.
    let candidate = garmin_candidate(30, 10000.0, 3600);
    assert_eq!(
        reconcile(&candidate, std::slice::from_ref(&existing)),
        ReconcileAction::Insert
    );
}

#[test]
fn test_manual_entry_without_metrics_matches_on_time() {
    let existing = strava_row(5000.0, 1800);
    let candidate = normalize(
        Provider::Garmin,
        json!({
            "activityId": 900,
            "activityType": "RUNNING",
            "startTimeInSeconds": NINE_AM + 90,
            "manual": true
        }),
        "athlete-1",
        &DisciplineLookup::default(),
    )
    .unwrap();

    assert_eq!(
        reconcile(&candidate, std::slice::from_ref(&existing)),
        ReconcileAction::MergeInto(existing.id.clone())
    );
}
