// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - Paginated activity listing within an optional time window
//! - Single activity and athlete profile fetches
//! - Token refresh
//! - Rate limit detection (surfaced as `SyncError::RateLimited`)

use crate::error::SyncError;
use crate::models::Provider;
use crate::services::provider::{
    into_activity_list, network_error, read_json, read_token_response,
    ActivityProvider, FetchWindow, Paging, ProviderAthlete, TokenGrant, MAX_PAGES,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Strava allows up to 200 activities per list page.
pub const STRAVA_PER_PAGE: u32 = 200;

/// Default pause between list pages.
pub const STRAVA_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    page_delay: Duration,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id,
            client_secret,
            page_delay: STRAVA_PAGE_DELAY,
        }
    }

    /// Override the inter-page delay (tests run against a local mock).
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, SyncError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network_error)?;

        read_json(response).await
    }
}

#[async_trait]
impl ActivityProvider for StravaClient {
    fn provider(&self) -> Provider {
        Provider::Strava
    }

    fn paging(&self) -> Paging {
        Paging {
            per_page: STRAVA_PER_PAGE,
            max_pages: MAX_PAGES,
            page_delay: self.page_delay,
        }
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        window: &FetchWindow,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/athlete/activities", self.base_url);

        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(after) = window.after {
            query.push(("after", after.timestamp().to_string()));
        }
        if let Some(before) = window.before {
            query.push(("before", before.timestamp().to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(network_error)?;

        read_json(response).await
    }

    async fn fetch_activity(
        &self,
        access_token: &str,
        external_id: &str,
    ) -> Result<Value, SyncError> {
        let url = format!(
            "{}/activities/{}",
            self.base_url,
            urlencoding::encode(external_id)
        );
        self.get_json(&url, access_token).await
    }

    async fn fetch_by_callback(
        &self,
        access_token: &str,
        callback_url: &str,
    ) -> Result<Vec<Value>, SyncError> {
        let body: Value = self.get_json(callback_url, access_token).await?;
        Ok(into_activity_list(body))
    }

    async fn fetch_athlete(&self, access_token: &str) -> Result<ProviderAthlete, SyncError> {
        let url = format!("{}/athlete", self.base_url);
        let athlete: StravaAthlete = self.get_json(&url, access_token).await?;
        Ok(athlete.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, SyncError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(network_error)?;

        read_token_response(response).await
    }
}

/// Strava activity payload (summary or detailed representation).
///
/// Summary and detail responses populate different subsets, so every field
/// is optional here; the normalizer decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StravaActivity {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub sport_type: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub start_date: Option<String>,
    pub start_date_local: Option<String>,
    pub timezone: Option<String>,
    pub elapsed_time: Option<u32>,
    pub moving_time: Option<u32>,
    pub distance: Option<f64>,
    pub total_elevation_gain: Option<f64>,
    pub elev_high: Option<f64>,
    pub elev_low: Option<f64>,
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub average_cadence: Option<f64>,
    pub average_watts: Option<f64>,
    pub max_watts: Option<f64>,
    pub calories: Option<f64>,
    pub kilojoules: Option<f64>,
    pub device_name: Option<String>,
    pub map: Option<StravaMap>,
    pub trainer: Option<bool>,
    pub commute: Option<bool>,
    pub manual: Option<bool>,
    pub private: Option<bool>,
    pub device_watts: Option<bool>,
}

impl StravaActivity {
    /// Get the detailed polyline, falling back to summary if not available.
    pub fn get_polyline(&self) -> Option<&str> {
        let map = self.map.as_ref()?;
        map.polyline
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(map.summary_polyline.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StravaMap {
    pub polyline: Option<String>,
    pub summary_polyline: Option<String>,
}

/// Authenticated athlete profile.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub profile: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub sex: Option<String>,
    pub weight: Option<f64>,
}

impl From<StravaAthlete> for ProviderAthlete {
    fn from(a: StravaAthlete) -> Self {
        ProviderAthlete {
            provider_athlete_id: a.id.to_string(),
            firstname: a.firstname,
            lastname: a.lastname,
            profile_picture: a.profile,
            city: a.city,
            country: a.country,
            sex: a.sex,
            weight: a.weight,
        }
    }
}
