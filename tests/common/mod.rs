// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use activity_sync::config::Config;
use activity_sync::db::{FirestoreDb, MemoryStore, SyncStore};
use activity_sync::error::SyncError;
use activity_sync::models::{Activity, Provider};
use activity_sync::routes::create_router;
use activity_sync::services::provider::{ProviderAthlete, TokenGrant};
use activity_sync::services::{
    ActivityProvider, FetchWindow, GoogleOidcVerifier, KmsService, Notifier, Paging,
    ProviderRegistry,
};
use activity_sync::AppState;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const TEST_KID: &str = "test-kid";
const TEST_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/keys/oidc_test_private.pem");
const TEST_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/keys/oidc_test_public.pem");

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Scriptable in-process provider.
pub struct FakeProvider {
    provider: Provider,
    per_page: u32,
    activities: Mutex<Vec<Value>>,
    callbacks: Mutex<HashMap<String, Vec<Value>>>,
    fetch_error: Mutex<Option<SyncError>>,
    fetch_delay: Mutex<std::time::Duration>,
    refresh_error: Mutex<Option<SyncError>>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    refresh_entered: Notify,
    page_requests: AtomicU32,
    refresh_calls: AtomicU32,
    tokens_seen: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            per_page: 200,
            activities: Mutex::new(Vec::new()),
            callbacks: Mutex::new(HashMap::new()),
            fetch_error: Mutex::new(None),
            fetch_delay: Mutex::new(std::time::Duration::ZERO),
            refresh_error: Mutex::new(None),
            refresh_gate: Mutex::new(None),
            refresh_entered: Notify::new(),
            page_requests: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn set_activities(&self, activities: Vec<Value>) {
        *self.activities.lock().unwrap() = activities;
    }

    pub fn add_callback(&self, url: &str, activities: Vec<Value>) {
        self.callbacks
            .lock()
            .unwrap()
            .insert(url.to_string(), activities);
    }

    /// Make every activity fetch fail with `error`.
    pub fn fail_fetches(&self, error: SyncError) {
        *self.fetch_error.lock().unwrap() = Some(error);
    }

    /// Make every activity fetch sleep for `delay` first.
    pub fn delay_fetches(&self, delay: std::time::Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Make every token refresh fail with `error`.
    pub fn fail_refreshes(&self, error: SyncError) {
        *self.refresh_error.lock().unwrap() = Some(error);
    }

    /// Hold every refresh until the returned gate is notified.
    pub fn gate_refreshes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a refresh has reached the gate.
    pub async fn refresh_started(&self) {
        self.refresh_entered.notified().await;
    }

    pub fn page_requests(&self) -> u32 {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Access tokens presented on fetch calls, in order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    async fn record(&self, access_token: &str) -> Result<(), SyncError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.tokens_seen
            .lock()
            .unwrap()
            .push(access_token.to_string());
        match self.fetch_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ActivityProvider for FakeProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn paging(&self) -> Paging {
        Paging {
            per_page: self.per_page,
            max_pages: 50,
            page_delay: std::time::Duration::ZERO,
        }
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        _window: &FetchWindow,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, SyncError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        self.record(access_token).await?;
        let activities = self.activities.lock().unwrap();
        let start = ((page - 1) * per_page) as usize;
        Ok(activities
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect())
    }

    async fn fetch_activity(
        &self,
        access_token: &str,
        external_id: &str,
    ) -> Result<Value, SyncError> {
        self.record(access_token).await?;
        self.activities
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                let id = a.get("id").or_else(|| a.get("activityId"));
                id.map(|v| v.to_string().trim_matches('"') == external_id)
                    .unwrap_or(false)
            })
            .cloned()
            .ok_or(SyncError::Provider {
                status: 404,
                body: "Record Not Found".to_string(),
            })
    }

    async fn fetch_by_callback(
        &self,
        access_token: &str,
        callback_url: &str,
    ) -> Result<Vec<Value>, SyncError> {
        self.record(access_token).await?;
        Ok(self
            .callbacks
            .lock()
            .unwrap()
            .get(callback_url)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_athlete(&self, _access_token: &str) -> Result<ProviderAthlete, SyncError> {
        Ok(ProviderAthlete {
            provider_athlete_id: "12345".to_string(),
            firstname: Some("Test".to_string()),
            lastname: Some("Athlete".to_string()),
            ..Default::default()
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, SyncError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.refresh_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.refresh_entered.notify_one();
            gate.notified().await;
        }
        if let Some(e) = self.refresh_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(TokenGrant {
            access_token: format!("refreshed-access-{n}"),
            refresh_token: Some(format!("refreshed-refresh-{n}")),
            expires_at: Utc::now() + Duration::hours(6),
        })
    }
}

/// Notifier that remembers what it was told.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// `(athlete_id, activity_id)` pairs, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn activity_synced(
        &self,
        athlete_id: &str,
        activity: &Activity,
    ) -> activity_sync::error::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((athlete_id.to_string(), activity.id.clone()));
        Ok(())
    }
}

/// Everything a test needs to poke at.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub strava: Arc<FakeProvider>,
    pub garmin: Arc<FakeProvider>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Create a test app with offline mock dependencies.
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let strava = Arc::new(FakeProvider::new(Provider::Strava));
    let garmin = Arc::new(FakeProvider::new(Provider::Garmin));
    let notifier = Arc::new(RecordingNotifier::default());

    let providers = ProviderRegistry::new()
        .with(strava.clone())
        .with(garmin.clone());

    let oidc_verifier = Arc::new(
        GoogleOidcVerifier::new_with_static_key(
            &config,
            TEST_KID,
            DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY).unwrap(),
        )
        .unwrap(),
    );

    let state = Arc::new(AppState::new(
        config,
        store.clone() as Arc<dyn SyncStore>,
        providers,
        KmsService::new_mock(),
        notifier.clone(),
        oidc_verifier,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        strava,
        garmin,
        notifier,
    }
}

#[derive(Serialize)]
struct TestClaims {
    iss: String,
    aud: String,
    sub: String,
    email: String,
    email_verified: bool,
    iat: u64,
    exp: u64,
}

/// Mint an ID token the static-key verifier accepts.
pub fn create_test_oidc_jwt(config: &Config) -> String {
    create_test_oidc_jwt_for(config, &config.internal_service_account())
}

pub fn create_test_oidc_jwt_for(config: &Config, email: &str) -> String {
    let now = Utc::now().timestamp() as u64;
    let claims = TestClaims {
        iss: "https://accounts.google.com".to_string(),
        aud: config.api_url.clone(),
        sub: "109876543210".to_string(),
        email: email.to_string(),
        email_verified: true,
        iat: now,
        exp: now + 3600,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY).unwrap(),
    )
    .unwrap()
}

/// Store a connected credential whose access token is `access-{athlete_id}`.
pub async fn connect_athlete(
    state: &AppState,
    provider: Provider,
    athlete_id: &str,
    provider_athlete_id: &str,
    expires_at: DateTime<Utc>,
) {
    state
        .tokens
        .save_tokens(
            provider,
            athlete_id,
            provider_athlete_id,
            TokenGrant {
                access_token: format!("access-{athlete_id}"),
                refresh_token: Some(format!("refresh-{athlete_id}")),
                expires_at,
            },
            vec!["activity:read_all".to_string()],
        )
        .await
        .unwrap();
}

/// Strava activity payload as returned by `GET /activities/{id}`.
pub fn strava_activity(id: u64, start: &str, distance: f64, elapsed: u32) -> Value {
    json!({
        "id": id,
        "name": format!("Run {id}"),
        "sport_type": "Run",
        "type": "Run",
        "start_date": start,
        "start_date_local": start,
        "timezone": "(GMT+00:00) UTC",
        "elapsed_time": elapsed,
        "moving_time": elapsed,
        "distance": distance,
        "total_elevation_gain": 12.0,
        "average_speed": distance / elapsed as f64,
        "trainer": false,
        "commute": false,
        "manual": false,
        "private": false
    })
}

/// Garmin activity summary as returned by a ping callback.
pub fn garmin_activity(
    activity_id: u64,
    user_id: &str,
    start_secs: i64,
    distance: f64,
    duration: u32,
    heart_rate: f64,
) -> Value {
    json!({
        "summaryId": format!("{activity_id}-detail"),
        "activityId": activity_id,
        "userId": user_id,
        "activityName": "Morning Run",
        "activityType": "RUNNING",
        "startTimeInSeconds": start_secs,
        "startTimeOffsetInSeconds": -25200,
        "durationInSeconds": duration,
        "distanceInMeters": distance,
        "averageHeartRateInBeatsPerMinute": heart_rate,
        "maxHeartRateInBeatsPerMinute": heart_rate + 20.0,
        "averageRunCadenceInStepsPerMinute": 172.0,
        "deviceName": "Forerunner 965"
    })
}

/// `n` Strava activities one hour apart, far enough apart not to merge.
pub fn strava_activities(n: u64) -> Vec<Value> {
    let base = DateTime::parse_from_rfc3339("2024-01-01T06:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    (0..n)
        .map(|i| {
            let start = base + Duration::hours(i as i64);
            strava_activity(
                1000 + i,
                &start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                5000.0,
                1800,
            )
        })
        .collect()
}
