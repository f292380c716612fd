// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read once at startup and cached in memory.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::Discipline;

/// Which datastore backend to connect at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatastoreKind {
    Firestore,
    /// In-process store, for local development only.
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Garmin OAuth client ID (public)
    pub garmin_client_id: String,
    /// GCP project ID (Firestore, KMS, Cloud Tasks)
    pub gcp_project_id: String,
    /// GCP region (KMS key ring, Cloud Tasks queue)
    pub gcp_region: String,
    /// Public URL of this service, used as the expected OIDC audience
    pub api_url: String,
    /// Server port
    pub port: u16,
    pub datastore: DatastoreKind,

    // --- Provider endpoints (overridable for tests) ---
    pub strava_api_url: String,
    pub strava_token_url: String,
    pub garmin_api_url: String,
    pub garmin_token_url: String,
    /// Expected Strava push subscription ID, if one is registered
    pub strava_subscription_id: Option<u64>,

    // --- Sync engine tuning ---
    /// Maximum jobs claimed per scheduler tick
    pub sync_batch_size: u32,
    /// In-progress jobs older than this are presumed crashed
    pub stale_job_after: chrono::Duration,
    /// Staleness resets allowed before a job fails permanently
    pub max_job_retries: u32,
    /// Terminal jobs older than this are purged
    pub job_retention: chrono::Duration,
    /// Wall-clock budget for webhook event processing
    pub webhook_budget: Duration,
    /// Discipline used when a provider type cannot be resolved
    pub default_discipline: Option<Discipline>,
    /// Endpoint that receives "activity synced" notifications
    pub notify_url: Option<String>,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Garmin OAuth client secret
    pub garmin_client_secret: String,
    /// Webhook verification token
    pub webhook_verify_token: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            garmin_client_id: "test_garmin_client_id".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            api_url: "http://localhost:8080".to_string(),
            port: 8080,
            datastore: DatastoreKind::Memory,
            strava_api_url: "https://www.strava.com/api/v3".to_string(),
            strava_token_url: "https://www.strava.com/oauth/token".to_string(),
            garmin_api_url: "https://apis.garmin.com/wellness-api/rest".to_string(),
            garmin_token_url: "https://connectapi.garmin.com/di-oauth2-service/oauth/token"
                .to_string(),
            strava_subscription_id: None,
            sync_batch_size: 5,
            stale_job_after: chrono::Duration::minutes(30),
            max_job_retries: 3,
            job_retention: chrono::Duration::days(30),
            webhook_budget: Duration::from_millis(1800),
            default_discipline: None,
            notify_url: None,
            strava_client_secret: "test_secret".to_string(),
            garmin_client_secret: "test_garmin_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Provider credentials, the webhook verify token and the GCP project are
    /// required; everything else falls back to a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        let default_discipline = match env::var("DEFAULT_DISCIPLINE") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                Discipline::from_code_name(raw.trim()).ok_or(ConfigError::Invalid {
                    key: "DEFAULT_DISCIPLINE",
                    reason: format!("unknown discipline '{}'", raw),
                })?,
            ),
            _ => None,
        };

        let datastore = match env::var("DATASTORE").as_deref() {
            Err(_) | Ok("firestore") => DatastoreKind::Firestore,
            Ok("memory") => DatastoreKind::Memory,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "DATASTORE",
                    reason: format!("expected 'firestore' or 'memory', got '{}'", other),
                })
            }
        };

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            garmin_client_id: required("GARMIN_CLIENT_ID")?,
            gcp_project_id: required("GCP_PROJECT_ID")?,
            gcp_region: env::var("GCP_REGION").unwrap_or(defaults.gcp_region),
            api_url: env::var("API_URL").unwrap_or(defaults.api_url),
            port: parsed("PORT", defaults.port)?,
            datastore,
            strava_api_url: env::var("STRAVA_API_URL").unwrap_or(defaults.strava_api_url),
            strava_token_url: env::var("STRAVA_TOKEN_URL").unwrap_or(defaults.strava_token_url),
            garmin_api_url: env::var("GARMIN_API_URL").unwrap_or(defaults.garmin_api_url),
            garmin_token_url: env::var("GARMIN_TOKEN_URL").unwrap_or(defaults.garmin_token_url),
            strava_subscription_id: optional_parsed("STRAVA_SUBSCRIPTION_ID")?,
            sync_batch_size: parsed("SYNC_BATCH_SIZE", defaults.sync_batch_size)?,
            stale_job_after: chrono::Duration::minutes(parsed("STALE_JOB_MINUTES", 30i64)?),
            max_job_retries: parsed("MAX_JOB_RETRIES", defaults.max_job_retries)?,
            job_retention: chrono::Duration::days(parsed("JOB_RETENTION_DAYS", 30i64)?),
            webhook_budget: Duration::from_millis(parsed("WEBHOOK_BUDGET_MS", 1800u64)?),
            default_discipline,
            notify_url: env::var("NOTIFY_URL").ok().filter(|v| !v.trim().is_empty()),

            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            garmin_client_secret: required("GARMIN_CLIENT_SECRET")?,
            webhook_verify_token: required("WEBHOOK_VERIFY_TOKEN")?,
        })
    }

    /// Service account that the scheduler and internal callers present in
    /// their OIDC tokens.
    pub fn internal_service_account(&self) -> String {
        format!(
            "activity-sync-api@{}.iam.gserviceaccount.com",
            self.gcp_project_id
        )
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn optional_parsed<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    key,
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
