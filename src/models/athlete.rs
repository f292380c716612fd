// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlete profile model.

use crate::models::Provider;
use crate::time_utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-side athlete profile, refreshed on new activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    pub athlete_id: String,
    pub provider: Provider,
    pub provider_athlete_id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    /// Profile picture URL
    pub profile_picture: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub sex: Option<String>,
    /// Kilograms
    pub weight: Option<f64>,
    #[serde(with = "time_utils::rfc3339")]
    pub updated_at: DateTime<Utc>,
}

impl AthleteProfile {
    /// Document ID in the `athletes` collection.
    pub fn doc_id(&self) -> String {
        format!(
            "{}_{}",
            self.provider.as_str(),
            urlencoding::encode(&self.athlete_id)
        )
    }
}
