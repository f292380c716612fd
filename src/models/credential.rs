// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential model.

use crate::models::Provider;
use crate::time_utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An athlete's OAuth tokens for one provider (encrypted in Firestore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthCredential {
    /// Internal athlete ID
    pub athlete_id: String,
    pub provider: Provider,
    /// The athlete's ID on the provider (Strava `owner_id`, Garmin `userId`)
    pub provider_athlete_id: String,
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    #[serde(with = "time_utils::rfc3339")]
    pub expires_at: DateTime<Utc>,
    pub connected: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(with = "time_utils::rfc3339")]
    pub updated_at: DateTime<Utc>,
}

impl OAuthCredential {
    /// Document ID in the `credentials` collection.
    pub fn doc_id(provider: Provider, athlete_id: &str) -> String {
        format!("{}_{}", provider.as_str(), urlencoding::encode(athlete_id))
    }

    /// True if the access token is still good at `at`.
    pub fn is_live_at(&self, at: DateTime<Utc>) -> bool {
        self.connected && at < self.expires_at
    }

    /// Wipe token material and mark disconnected.
    pub fn clear(&mut self) {
        self.access_token_encrypted.clear();
        self.refresh_token_encrypted.clear();
        self.connected = false;
        self.expires_at = DateTime::<Utc>::UNIX_EPOCH;
        self.updated_at = Utc::now();
    }
}
