// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Connect API client.
//!
//! Garmin pushes ping notifications that carry a callback URL instead of
//! activity data, so `fetch_by_callback` is the main ingestion path here.
//! Callback URLs must point at the configured API origin.

use crate::error::SyncError;
use crate::models::Provider;
use crate::services::provider::{
    into_activity_list, network_error, read_json, read_token_response,
    ActivityProvider, FetchWindow, Paging, ProviderAthlete, TokenGrant, MAX_PAGES,
};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Garmin caps list pages at 100 summaries.
pub const GARMIN_PER_PAGE: u32 = 100;

pub const GARMIN_PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct GarminClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    page_delay: Duration,
}

impl GarminClient {
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
            page_delay: GARMIN_PAGE_DELAY,
        }
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Reject callback URLs outside the API origin.
    fn check_callback(&self, callback_url: &str) -> Result<Url, SyncError> {
        let invalid = |reason: &str| {
            SyncError::InvalidPayload(format!("callback URL {}: {}", callback_url, reason))
        };
        let callback = Url::parse(callback_url).map_err(|e| invalid(&e.to_string()))?;
        let base = Url::parse(&self.base_url).map_err(|e| invalid(&e.to_string()))?;
        if callback.origin() != base.origin() {
            return Err(invalid("origin does not match the Garmin API"));
        }
        Ok(callback)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
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

    fn url(&self, path: &str) -> Result<Url, SyncError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| SyncError::InvalidPayload(format!("bad Garmin URL: {}", e)))
    }
}

#[async_trait]
impl ActivityProvider for GarminClient {
    fn provider(&self) -> Provider {
        Provider::Garmin
    }

    fn paging(&self) -> Paging {
        Paging {
            per_page: GARMIN_PER_PAGE,
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
        let mut url = self.url("/activities")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &per_page.to_string());
            if let Some(after) = window.after {
                query.append_pair("after", &after.timestamp().to_string());
            }
            if let Some(before) = window.before {
                query.append_pair("before", &before.timestamp().to_string());
            }
        }

        self.get_json(url, access_token).await
    }

    async fn fetch_activity(
        &self,
        access_token: &str,
        external_id: &str,
    ) -> Result<Value, SyncError> {
        let url = self.url(&format!("/activities/{}", urlencoding::encode(external_id)))?;
        self.get_json(url, access_token).await
    }

    async fn fetch_by_callback(
        &self,
        access_token: &str,
        callback_url: &str,
    ) -> Result<Vec<Value>, SyncError> {
        let url = self.check_callback(callback_url)?;
        let body: Value = self.get_json(url, access_token).await?;
        Ok(into_activity_list(body))
    }

    async fn fetch_athlete(&self, access_token: &str) -> Result<ProviderAthlete, SyncError> {
        let user: GarminUser = self.get_json(self.url("/user/id")?, access_token).await?;
        Ok(ProviderAthlete {
            provider_athlete_id: user.user_id,
            ..Default::default()
        })
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminUser {
    user_id: String,
}

/// Garmin activity summary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GarminActivity {
    pub summary_id: Option<String>,
    pub activity_id: Option<u64>,
    pub user_id: Option<String>,
    pub activity_name: Option<String>,
    pub activity_type: Option<String>,
    pub start_time_in_seconds: Option<i64>,
    /// Local offset from UTC
    pub start_time_offset_in_seconds: Option<i64>,
    pub duration_in_seconds: Option<u32>,
    pub moving_duration_in_seconds: Option<u32>,
    pub distance_in_meters: Option<f64>,
    pub total_elevation_gain_in_meters: Option<f64>,
    pub average_speed_in_meters_per_second: Option<f64>,
    pub max_speed_in_meters_per_second: Option<f64>,
    pub average_heart_rate_in_beats_per_minute: Option<f64>,
    pub max_heart_rate_in_beats_per_minute: Option<f64>,
    pub average_run_cadence_in_steps_per_minute: Option<f64>,
    pub average_bike_cadence_in_rounds_per_minute: Option<f64>,
    pub average_power_in_watts: Option<f64>,
    pub max_power_in_watts: Option<f64>,
    pub active_kilocalories: Option<f64>,
    pub device_name: Option<String>,
    pub manual: Option<bool>,
}

impl GarminActivity {
    /// Provider-side ID, preferring the stable activity ID.
    pub fn external_id(&self) -> Option<String> {
        self.activity_id
            .map(|id| id.to_string())
            .or_else(|| self.summary_id.clone())
    }

    pub fn cadence(&self) -> Option<f64> {
        self.average_run_cadence_in_steps_per_minute
            .or(self.average_bike_cadence_in_rounds_per_minute)
    }
}

/// Ping notification body posted to the Garmin webhook.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GarminPing {
    pub activities: Vec<GarminPingEntry>,
    pub deregistrations: Vec<GarminDeregistration>,
}

/// One activity notification: either a callback reference or an inline
/// summary (push mode).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarminPingEntry {
    pub user_id: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: Option<String>,
    #[serde(flatten)]
    pub summary: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarminDeregistration {
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::http_client;
    use serde_json::json;

    fn client() -> GarminClient {
        GarminClient::new(
            http_client().unwrap(),
            "https://apis.garmin.example/wellness-api/rest",
            "https://apis.garmin.example/oauth/token",
            "id".to_string(),
            "secret".to_string(),
        )
    }

    #[test]
    fn callback_must_share_api_origin() {
        let c = client();
        assert!(c
            .check_callback("https://apis.garmin.example/wellness-api/rest/activities?token=x")
            .is_ok());
        assert!(matches!(
            c.check_callback("https://evil.example/activities"),
            Err(SyncError::InvalidPayload(_))
        ));
        assert!(c.check_callback("not a url").is_err());
    }

    #[test]
    fn ping_with_callback_and_inline_summary() {
        let ping: GarminPing = serde_json::from_value(json!({
            "activities": [
                { "userId": "u1", "callbackURL": "https://apis.garmin.example/x" },
                { "userId": "u2", "activityId": 77, "startTimeInSeconds": 1714554000 }
            ],
            "deregistrations": [ { "userId": "u3", "userAccessToken": "t" } ]
        }))
        .unwrap();

        assert_eq!(ping.activities.len(), 2);
        assert!(ping.activities[0].callback_url.is_some());
        assert!(ping.activities[1].callback_url.is_none());
        assert_eq!(ping.activities[1].summary["activityId"], 77);
        assert_eq!(ping.deregistrations[0].user_id, "u3");
    }

    #[test]
    fn external_id_prefers_activity_id() {
        let a: GarminActivity =
            serde_json::from_value(json!({ "summaryId": "s-1", "activityId": 9 })).unwrap();
        assert_eq!(a.external_id().as_deref(), Some("9"));

        let b: GarminActivity = serde_json::from_value(json!({ "summaryId": "s-1" })).unwrap();
        assert_eq!(b.external_id().as_deref(), Some("s-1"));
    }
}
