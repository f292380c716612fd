// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider and source tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A third-party fitness platform we pull activities from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Strava,
    Garmin,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Strava, Provider::Garmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Strava => "strava",
            Provider::Garmin => "garmin",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stored activity report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    Strava,
    Garmin,
    Manual,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::Strava => "strava",
            ActivitySource::Garmin => "garmin",
            ActivitySource::Manual => "manual",
        }
    }

    /// Key used to index a `(source, external_id)` pair.
    pub fn key(&self, external_id: &str) -> String {
        format!("{}:{}", self.as_str(), external_id)
    }
}

impl From<Provider> for ActivitySource {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Strava => ActivitySource::Strava,
            Provider::Garmin => ActivitySource::Garmin,
        }
    }
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
