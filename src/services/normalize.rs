// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map provider payloads onto the canonical [`Activity`].
//!
//! Units stay as the provider reports them (meters, m/s). Missing sensor
//! values stay `None` so "not recorded" is distinguishable from zero; absent
//! flags become `false`. The payload is kept verbatim in `raw_payload`.

use crate::error::SyncError;
use crate::models::{Activity, ActivitySource, DisciplineLookup, Provider};
use crate::services::garmin::GarminActivity;
use crate::services::strava::StravaActivity;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

const UNTITLED: &str = "Untitled activity";

/// Normalize one raw provider activity for `athlete_id`.
///
/// Fails only when the payload cannot identify the workout: no provider ID,
/// no parseable start time, or not an object at all.
pub fn normalize(
    provider: Provider,
    raw: Value,
    athlete_id: &str,
    lookup: &DisciplineLookup,
) -> Result<Activity, SyncError> {
    match provider {
        Provider::Strava => normalize_strava(raw, athlete_id, lookup),
        Provider::Garmin => normalize_garmin(raw, athlete_id, lookup),
    }
}

fn normalize_strava(
    raw: Value,
    athlete_id: &str,
    lookup: &DisciplineLookup,
) -> Result<Activity, SyncError> {
    let a = StravaActivity::deserialize(&raw)
        .map_err(|e| SyncError::InvalidPayload(format!("strava activity: {}", e)))?;

    let external_id = a
        .id
        .ok_or_else(|| SyncError::InvalidPayload("strava activity has no id".to_string()))?
        .to_string();
    let start_time = a
        .start_date
        .as_deref()
        .and_then(parse_instant)
        .ok_or_else(|| {
            SyncError::InvalidPayload(format!("strava activity {} has no start_date", external_id))
        })?;

    let discipline = resolve(
        lookup,
        Provider::Strava,
        &external_id,
        a.sport_type.as_deref(),
        a.activity_type.as_deref(),
    );

    let now = Utc::now();
    let source = ActivitySource::Strava;
    Ok(Activity {
        // Strava IDs are globally unique, so they make a stable key.
        id: format!("{}:{}", source, external_id),
        athlete_id: athlete_id.to_string(),
        source,
        source_keys: vec![source.key(&external_id)],
        discipline,
        name: a.name.clone().unwrap_or_else(|| UNTITLED.to_string()),
        start_time,
        start_time_local: a.start_date_local.as_deref().and_then(parse_wall_clock),
        timezone: a.timezone.clone(),
        elapsed_time_secs: a.elapsed_time,
        moving_time_secs: a.moving_time,
        distance_meters: a.distance,
        elevation_gain_meters: a.total_elevation_gain,
        elevation_high_meters: a.elev_high,
        elevation_low_meters: a.elev_low,
        average_speed: a.average_speed,
        max_speed: a.max_speed,
        average_heartrate: a.average_heartrate,
        max_heartrate: a.max_heartrate,
        average_cadence: a.average_cadence,
        average_watts: a.average_watts,
        max_watts: a.max_watts,
        // Ride work in kJ is roughly kcal burned at typical pedaling efficiency.
        calories: a.calories.or(a.kilojoules),
        device_name: a.device_name.clone(),
        polyline: a.get_polyline().map(str::to_string),
        trainer: a.trainer.unwrap_or(false),
        commute: a.commute.unwrap_or(false),
        manual: a.manual.unwrap_or(false),
        private: a.private.unwrap_or(false),
        device_watts: a.device_watts.unwrap_or(false),
        external_id: Some(external_id),
        raw_payload: raw,
        merged_reports: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

fn normalize_garmin(
    raw: Value,
    athlete_id: &str,
    lookup: &DisciplineLookup,
) -> Result<Activity, SyncError> {
    let a = GarminActivity::deserialize(&raw)
        .map_err(|e| SyncError::InvalidPayload(format!("garmin activity: {}", e)))?;

    let external_id = a
        .external_id()
        .ok_or_else(|| SyncError::InvalidPayload("garmin activity has no id".to_string()))?;
    let start_time = a
        .start_time_in_seconds
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            SyncError::InvalidPayload(format!(
                "garmin activity {} has no startTimeInSeconds",
                external_id
            ))
        })?;
    let start_time_local = a
        .start_time_offset_in_seconds
        .map(|offset| (start_time + chrono::Duration::seconds(offset)).naive_utc());

    let discipline = resolve(
        lookup,
        Provider::Garmin,
        &external_id,
        a.activity_type.as_deref(),
        None,
    );

    let now = Utc::now();
    let source = ActivitySource::Garmin;
    Ok(Activity {
        // Garmin summary IDs are only unique per user.
        id: format!("{}:{}:{}", source, athlete_id, external_id),
        athlete_id: athlete_id.to_string(),
        source,
        source_keys: vec![source.key(&external_id)],
        discipline,
        name: a
            .activity_name
            .clone()
            .unwrap_or_else(|| UNTITLED.to_string()),
        start_time,
        start_time_local,
        timezone: None,
        elapsed_time_secs: a.duration_in_seconds,
        moving_time_secs: a.moving_duration_in_seconds,
        distance_meters: a.distance_in_meters,
        elevation_gain_meters: a.total_elevation_gain_in_meters,
        elevation_high_meters: None,
        elevation_low_meters: None,
        average_speed: a.average_speed_in_meters_per_second,
        max_speed: a.max_speed_in_meters_per_second,
        average_heartrate: a.average_heart_rate_in_beats_per_minute,
        max_heartrate: a.max_heart_rate_in_beats_per_minute,
        average_cadence: a.cadence(),
        average_watts: a.average_power_in_watts,
        max_watts: a.max_power_in_watts,
        calories: a.active_kilocalories,
        device_name: a.device_name.clone(),
        polyline: None,
        trainer: false,
        commute: false,
        manual: a.manual.unwrap_or(false),
        private: false,
        device_watts: false,
        external_id: Some(external_id),
        raw_payload: raw,
        merged_reports: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

fn resolve(
    lookup: &DisciplineLookup,
    provider: Provider,
    external_id: &str,
    fine: Option<&str>,
    coarse: Option<&str>,
) -> crate::models::Discipline {
    let (discipline, matched) = lookup.resolve(fine, coarse);
    if !matched {
        tracing::warn!(
            %provider,
            external_id,
            fine_type = fine.unwrap_or(""),
            coarse_type = coarse.unwrap_or(""),
            fallback = discipline.code(),
            "Unrecognized activity type, using fallback discipline"
        );
    }
    discipline
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Strava sends local wall-clock time with a misleading `Z` suffix.
fn parse_wall_clock(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
}
