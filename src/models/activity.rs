// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canonical activity model for storage.

use crate::models::{ActivitySource, Discipline};
use crate::time_utils;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored activity record in Firestore.
///
/// One record exists per real-world workout. Reports of the same workout
/// from other providers are folded in as [`MergedReport`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Document ID
    pub id: String,
    /// Internal athlete ID (owner)
    pub athlete_id: String,
    pub source: ActivitySource,
    /// Provider-side activity ID, absent for manual entries
    pub external_id: Option<String>,
    pub discipline: Discipline,
    pub name: String,

    #[serde(with = "time_utils::rfc3339")]
    pub start_time: DateTime<Utc>,
    /// Wall-clock start in the athlete's timezone
    pub start_time_local: Option<NaiveDateTime>,
    pub timezone: Option<String>,

    pub elapsed_time_secs: Option<u32>,
    pub moving_time_secs: Option<u32>,
    /// Meters
    pub distance_meters: Option<f64>,
    pub elevation_gain_meters: Option<f64>,
    pub elevation_high_meters: Option<f64>,
    pub elevation_low_meters: Option<f64>,
    /// m/s
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub average_cadence: Option<f64>,
    pub average_watts: Option<f64>,
    pub max_watts: Option<f64>,
    pub calories: Option<f64>,
    pub device_name: Option<String>,
    pub polyline: Option<String>,

    #[serde(default)]
    pub trainer: bool,
    #[serde(default)]
    pub commute: bool,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub device_watts: bool,

    /// Provider payload exactly as received
    pub raw_payload: serde_json::Value,
    /// Reports from other providers merged into this record
    #[serde(default)]
    pub merged_reports: Vec<MergedReport>,
    /// Every `source:external_id` key this record answers to
    #[serde(default)]
    pub source_keys: Vec<String>,

    #[serde(with = "time_utils::rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "time_utils::rfc3339")]
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// `source:external_id` key of the primary report.
    pub fn source_key(&self) -> Option<String> {
        self.external_id
            .as_deref()
            .map(|external_id| self.source.key(external_id))
    }

    /// True if this record (or one merged into it) came from the given report.
    pub fn answers_to(&self, source: ActivitySource, external_id: &str) -> bool {
        let key = source.key(external_id);
        self.source_keys.iter().any(|k| *k == key)
    }
}

/// A duplicate report from another provider, kept for reprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReport {
    pub source: ActivitySource,
    pub external_id: Option<String>,
    pub raw_payload: serde_json::Value,
    #[serde(with = "time_utils::rfc3339")]
    pub merged_at: DateTime<Utc>,
}
