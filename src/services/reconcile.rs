// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cross-provider duplicate detection and merging.
//!
//! Two reports describe the same workout when they come from different
//! sources, start within two minutes of each other, and agree on distance
//! (±100 m) and elapsed time (±60 s). A dimension missing on either side
//! does not count against a match.

use crate::models::{Activity, ActivitySource, MergedReport};
use chrono::{DateTime, Utc};

/// Start times within this many seconds are match candidates.
pub const MATCH_WINDOW_SECS: i64 = 120;

pub const DISTANCE_TOLERANCE_METERS: f64 = 100.0;

pub const DURATION_TOLERANCE_SECS: u32 = 60;

/// What to do with a normalized candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Insert,
    /// Fold the candidate into the stored activity with this ID.
    MergeInto(String),
}

/// Decide whether `candidate` duplicates one of `existing`.
///
/// Among all matches the one with the smallest start-time delta wins; on
/// equal deltas the earlier entry in `existing` wins.
pub fn reconcile(candidate: &Activity, existing: &[Activity]) -> ReconcileAction {
    existing
        .iter()
        .filter(|other| is_duplicate(candidate, other))
        .min_by_key(|other| start_delta_ms(candidate, other))
        .map(|other| ReconcileAction::MergeInto(other.id.clone()))
        .unwrap_or(ReconcileAction::Insert)
}

/// True if `other` is another provider's report of the candidate's workout.
pub fn is_duplicate(candidate: &Activity, other: &Activity) -> bool {
    if other.source == candidate.source || carries_source(other, candidate.source) {
        return false;
    }
    if start_delta_ms(candidate, other) > MATCH_WINDOW_SECS * 1000 {
        return false;
    }

    let distance_ok = match (candidate.distance_meters, other.distance_meters) {
        (Some(a), Some(b)) => (a - b).abs() <= DISTANCE_TOLERANCE_METERS,
        _ => true,
    };
    let duration_ok = match (candidate.elapsed_time_secs, other.elapsed_time_secs) {
        (Some(a), Some(b)) => a.abs_diff(b) <= DURATION_TOLERANCE_SECS,
        _ => true,
    };

    distance_ok && duration_ok
}

fn start_delta_ms(a: &Activity, b: &Activity) -> i64 {
    (a.start_time - b.start_time).num_milliseconds().abs()
}

/// A record that already holds a report from `source` is not a duplicate
/// target for a different report from that same source.
fn carries_source(activity: &Activity, source: ActivitySource) -> bool {
    activity.merged_reports.iter().any(|r| r.source == source)
}

/// Wearables are authoritative for sensor-derived fields.
fn is_wearable(source: ActivitySource) -> bool {
    matches!(source, ActivitySource::Garmin)
}

fn fill<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if target.is_none() {
        target.clone_from(value);
    }
}

fn supersede<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

/// Merge a duplicate report into the stored record.
///
/// Identity, start time, distance and elapsed time already present are kept.
/// Sensor fields are taken from a wearable report; every other field only
/// fills gaps. The report's raw payload is kept as a [`MergedReport`].
pub fn merge(existing: &mut Activity, candidate: &Activity, now: DateTime<Utc>) {
    let sensors: fn(&mut Option<f64>, &Option<f64>) = if is_wearable(candidate.source) {
        supersede
    } else {
        fill
    };
    sensors(&mut existing.average_heartrate, &candidate.average_heartrate);
    sensors(&mut existing.max_heartrate, &candidate.max_heartrate);
    sensors(&mut existing.average_cadence, &candidate.average_cadence);
    sensors(&mut existing.average_watts, &candidate.average_watts);
    sensors(&mut existing.max_watts, &candidate.max_watts);
    if is_wearable(candidate.source) {
        supersede(&mut existing.device_name, &candidate.device_name);
    } else {
        fill(&mut existing.device_name, &candidate.device_name);
    }

    fill(&mut existing.distance_meters, &candidate.distance_meters);
    fill(&mut existing.elapsed_time_secs, &candidate.elapsed_time_secs);
    fill(&mut existing.moving_time_secs, &candidate.moving_time_secs);
    fill(&mut existing.start_time_local, &candidate.start_time_local);
    fill(&mut existing.timezone, &candidate.timezone);
    fill(&mut existing.elevation_gain_meters, &candidate.elevation_gain_meters);
    fill(&mut existing.elevation_high_meters, &candidate.elevation_high_meters);
    fill(&mut existing.elevation_low_meters, &candidate.elevation_low_meters);
    fill(&mut existing.average_speed, &candidate.average_speed);
    fill(&mut existing.max_speed, &candidate.max_speed);
    fill(&mut existing.calories, &candidate.calories);
    fill(&mut existing.polyline, &candidate.polyline);
    existing.device_watts |= candidate.device_watts;

    let report = MergedReport {
        source: candidate.source,
        external_id: candidate.external_id.clone(),
        raw_payload: candidate.raw_payload.clone(),
        merged_at: now,
    };
    match existing
        .merged_reports
        .iter_mut()
        .find(|r| r.source == report.source && r.external_id == report.external_id)
    {
        Some(slot) => *slot = report,
        None => existing.merged_reports.push(report),
    }

    if let Some(key) = candidate.source_key() {
        if !existing.source_keys.contains(&key) {
            existing.source_keys.push(key);
        }
    }

    existing.updated_at = now;
}

/// Apply a fresh copy of a record's own primary report.
///
/// The new report's values win, except that fields it leaves empty keep
/// their stored values and sensor fields merged from a wearable are kept.
pub fn refresh_primary(existing: &Activity, mut fresh: Activity, now: DateTime<Utc>) -> Activity {
    fresh.id.clone_from(&existing.id);
    fresh.created_at = existing.created_at;
    fresh.updated_at = now;
    fresh.merged_reports.clone_from(&existing.merged_reports);
    for key in &existing.source_keys {
        if !fresh.source_keys.contains(key) {
            fresh.source_keys.push(key.clone());
        }
    }

    let wearable_merged = existing
        .merged_reports
        .iter()
        .any(|r| is_wearable(r.source));
    let sensors: fn(&mut Option<f64>, &Option<f64>) = if wearable_merged {
        supersede
    } else {
        fill
    };
    sensors(&mut fresh.average_heartrate, &existing.average_heartrate);
    sensors(&mut fresh.max_heartrate, &existing.max_heartrate);
    sensors(&mut fresh.average_cadence, &existing.average_cadence);
    sensors(&mut fresh.average_watts, &existing.average_watts);
    sensors(&mut fresh.max_watts, &existing.max_watts);
    if wearable_merged {
        supersede(&mut fresh.device_name, &existing.device_name);
    } else {
        fill(&mut fresh.device_name, &existing.device_name);
    }

    fill(&mut fresh.distance_meters, &existing.distance_meters);
    fill(&mut fresh.elapsed_time_secs, &existing.elapsed_time_secs);
    fill(&mut fresh.moving_time_secs, &existing.moving_time_secs);
    fill(&mut fresh.start_time_local, &existing.start_time_local);
    fill(&mut fresh.timezone, &existing.timezone);
    fill(&mut fresh.elevation_gain_meters, &existing.elevation_gain_meters);
    fill(&mut fresh.elevation_high_meters, &existing.elevation_high_meters);
    fill(&mut fresh.elevation_low_meters, &existing.elevation_low_meters);
    fill(&mut fresh.average_speed, &existing.average_speed);
    fill(&mut fresh.max_speed, &existing.max_speed);
    fill(&mut fresh.calories, &existing.calories);
    fill(&mut fresh.polyline, &existing.polyline);

    fresh
}
