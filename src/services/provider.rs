// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider client abstraction.
//!
//! Each provider exposes the same small surface (page fetch, single fetch,
//! callback fetch, athlete profile, token refresh). Pagination lives here
//! once, in [`fetch_activities`], so every provider gets the same stop rules
//! and inter-page delay.

use crate::error::SyncError;
use crate::models::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Hard cap on pages per fetch, regardless of what the provider returns.
pub const MAX_PAGES: u32 = 50;

/// Timeout applied to every provider HTTP request.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Optional time bounds for a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchWindow {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

/// Provider-imposed paging limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub per_page: u32,
    pub max_pages: u32,
    /// Sleep between page requests to stay under the rate limit
    pub page_delay: Duration,
}

/// Token pair returned from a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some providers only rotate the refresh token occasionally.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Athlete profile as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderAthlete {
    pub provider_athlete_id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub profile_picture: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub sex: Option<String>,
    pub weight: Option<f64>,
}

/// A provider REST client. Raw activities are returned untouched so the
/// normalizer can keep the original payload.
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn paging(&self) -> Paging;

    /// Fetch one page (1-based) of activities.
    async fn fetch_page(
        &self,
        access_token: &str,
        window: &FetchWindow,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, SyncError>;

    async fn fetch_activity(&self, access_token: &str, external_id: &str)
        -> Result<Value, SyncError>;

    /// Fetch whatever a notification callback URL points at.
    async fn fetch_by_callback(
        &self,
        access_token: &str,
        callback_url: &str,
    ) -> Result<Vec<Value>, SyncError>;

    async fn fetch_athlete(&self, access_token: &str) -> Result<ProviderAthlete, SyncError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, SyncError>;
}

/// Fetch activities page by page.
///
/// Stops on a short page, when `max_activities` is reached, or after
/// `max_pages` pages. The page size is shrunk up front when the cap fits
/// on a single page, so a limited sync never over-fetches.
pub async fn fetch_activities(
    client: &dyn ActivityProvider,
    access_token: &str,
    window: &FetchWindow,
    max_activities: Option<u32>,
) -> Result<Vec<Value>, SyncError> {
    let paging = client.paging();
    let per_page = match max_activities {
        Some(max) => max.clamp(1, paging.per_page),
        None => paging.per_page,
    };
    let cap = max_activities.map(|m| m as usize);

    let mut activities = Vec::new();
    for page in 1..=paging.max_pages {
        if page > 1 {
            tokio::time::sleep(paging.page_delay).await;
        }

        let batch = client
            .fetch_page(access_token, window, page, per_page)
            .await?;
        let received = batch.len();
        activities.extend(batch);

        tracing::debug!(
            provider = %client.provider(),
            page,
            received,
            total = activities.len(),
            "Fetched activity page"
        );

        if let Some(cap) = cap {
            if activities.len() >= cap {
                activities.truncate(cap);
                break;
            }
        }
        if received < per_page as usize {
            break;
        }
        if page == paging.max_pages {
            tracing::warn!(
                provider = %client.provider(),
                pages = page,
                "Page safety cap reached, stopping fetch"
            );
        }
    }

    Ok(activities)
}

/// Provider clients keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ActivityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, client: Arc<dyn ActivityProvider>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ActivityProvider>, SyncError> {
        self.clients
            .get(&provider)
            .cloned()
            .ok_or_else(|| SyncError::Unconfigured(provider.to_string()))
    }
}

// ─── Shared HTTP helpers ─────────────────────────────────────────────────────

/// HTTP client shared by every provider, with the request timeout applied.
pub fn http_client() -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))
}

/// Map a transport failure.
pub(crate) fn network_error(e: reqwest::Error) -> SyncError {
    SyncError::Network(e.to_string())
}

/// Map a non-2xx provider response onto the error taxonomy.
pub(crate) async fn status_error(response: reqwest::Response) -> SyncError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    match status {
        429 => {
            tracing::warn!("Provider rate limit hit (429)");
            SyncError::RateLimited
        }
        401 | 403 => SyncError::Auth(format!("HTTP {}: {}", status, body)),
        _ => SyncError::Provider { status, body },
    }
}

/// Check response status and parse the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SyncError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| SyncError::InvalidPayload(format!("JSON parse error: {}", e)))
}

/// Parse a token endpoint response. A rejected refresh token is a
/// [`SyncError::Refresh`]; everything else maps as usual.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
) -> Result<TokenGrant, SyncError> {
    let status = response.status().as_u16();
    if matches!(status, 400 | 401) {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Refresh(format!("HTTP {}: {}", status, body)));
    }

    let token: TokenResponse = read_json(response).await?;
    let expires_at = match (token.expires_at, token.expires_in) {
        (Some(at), _) => DateTime::from_timestamp(at, 0),
        (None, Some(secs)) => Some(Utc::now() + chrono::Duration::seconds(secs)),
        (None, None) => None,
    }
    .ok_or_else(|| SyncError::InvalidPayload("token response has no expiry".to_string()))?;

    Ok(TokenGrant {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
    })
}

/// Callback bodies may be a single object or a list.
pub(crate) fn into_activity_list(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Token endpoint response (Strava sends `expires_at`, Garmin `expires_in`).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
}
