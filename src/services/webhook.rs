// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-activity ingestion for provider push notifications.
//!
//! Only one activity's worth of work happens per event; the HTTP layer wraps
//! these calls in the provider's wall-clock budget.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{AthleteProfile, OAuthCredential, Provider};
use crate::services::credentials::TokenManager;
use crate::services::garmin::{GarminPing, GarminPingEntry};
use crate::services::ingest::{ActivityIngestor, IngestAction, IngestOutcome};
use crate::services::provider::{ProviderAthlete, ProviderRegistry};
use crate::services::tasks::Notifier;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Strava webhook event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaEvent {
    pub aspect_type: String,
    pub object_type: String,
    pub object_id: u64,
    pub owner_id: u64,
    pub subscription_id: Option<u64>,
    pub event_time: Option<i64>,
    #[serde(default)]
    pub updates: serde_json::Map<String, Value>,
}

/// What a Strava event asks us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Deauthorize,
    ActivityCreated,
    ActivityUpdated,
    ActivityDeleted,
    Ignored,
}

impl StravaEvent {
    pub fn kind(&self) -> EventKind {
        // `authorized: "false"` arrives as a string on athlete updates.
        let deauthorized = match self.updates.get("authorized") {
            Some(Value::String(s)) => s == "false",
            Some(Value::Bool(b)) => !b,
            _ => false,
        };
        if self.aspect_type == "update" && deauthorized {
            return EventKind::Deauthorize;
        }

        match (self.aspect_type.as_str(), self.object_type.as_str()) {
            ("create", "activity") => EventKind::ActivityCreated,
            ("update", "activity") => EventKind::ActivityUpdated,
            ("delete", "activity") => EventKind::ActivityDeleted,
            _ => EventKind::Ignored,
        }
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ingested(IngestAction),
    Deauthorized { cleared: bool },
    /// The athlete is not (or no longer) connected.
    NotConnected,
    Acknowledged,
}

/// Summary of one Garmin ping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingReport {
    pub ingested: u32,
    pub failed: u32,
    pub skipped: u32,
    pub deregistered: u32,
}

#[derive(Clone)]
pub struct WebhookIngestor {
    store: Arc<dyn SyncStore>,
    providers: ProviderRegistry,
    tokens: TokenManager,
    ingestor: ActivityIngestor,
    notifier: Arc<dyn Notifier>,
}

impl WebhookIngestor {
    pub fn new(
        store: Arc<dyn SyncStore>,
        providers: ProviderRegistry,
        tokens: TokenManager,
        ingestor: ActivityIngestor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            providers,
            tokens,
            ingestor,
            notifier,
        }
    }

    /// Handle a Strava content event.
    ///
    /// Errors from deauthorization are returned so the caller can report
    /// failure; everything else is for the caller to log and acknowledge.
    pub async fn handle_strava(&self, event: &StravaEvent) -> Result<EventOutcome, SyncError> {
        let owner = event.owner_id.to_string();
        let kind = event.kind();

        tracing::info!(
            aspect_type = %event.aspect_type,
            object_type = %event.object_type,
            object_id = event.object_id,
            owner_id = event.owner_id,
            ?kind,
            "Strava webhook event"
        );

        match kind {
            EventKind::Deauthorize => self.deauthorize(Provider::Strava, &owner).await,
            EventKind::ActivityCreated => {
                self.fetch_one(&owner, &event.object_id.to_string(), true)
                    .await
            }
            EventKind::ActivityUpdated => {
                self.fetch_one(&owner, &event.object_id.to_string(), false)
                    .await
            }
            EventKind::ActivityDeleted => {
                tracing::info!(
                    object_id = event.object_id,
                    owner_id = event.owner_id,
                    "Activity deleted on Strava, stored record kept"
                );
                Ok(EventOutcome::Acknowledged)
            }
            EventKind::Ignored => Ok(EventOutcome::Acknowledged),
        }
    }

    /// Handle a Garmin ping. Deregistration failures are returned; per
    /// activity failures are logged and counted.
    pub async fn handle_garmin(&self, ping: GarminPing) -> Result<PingReport, SyncError> {
        let mut report = PingReport::default();

        for deregistration in &ping.deregistrations {
            if let EventOutcome::Deauthorized { cleared: true } = self
                .deauthorize(Provider::Garmin, &deregistration.user_id)
                .await?
            {
                report.deregistered += 1;
            }
        }

        for entry in ping.activities {
            let user_id = entry.user_id.clone();
            match self.ingest_ping_entry(entry).await {
                Ok(Some(n)) => report.ingested += n,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(user_id = %user_id, error = %e, "Garmin ping entry failed");
                }
            }
        }

        tracing::info!(
            ingested = report.ingested,
            failed = report.failed,
            skipped = report.skipped,
            deregistered = report.deregistered,
            "Garmin ping handled"
        );
        Ok(report)
    }

    /// `Ok(None)` if the user is not connected.
    async fn ingest_ping_entry(&self, entry: GarminPingEntry) -> Result<Option<u32>, SyncError> {
        let Some(credential) = self.connected_credential(Provider::Garmin, &entry.user_id).await?
        else {
            return Ok(None);
        };

        let raw_activities = match entry.callback_url {
            Some(url) => {
                let access_token = match self
                    .tokens
                    .live_access_token(Provider::Garmin, &credential.athlete_id)
                    .await
                {
                    Err(SyncError::NotConnected(_)) => return Ok(None),
                    other => other?,
                };
                let client = self.providers.get(Provider::Garmin)?;
                client.fetch_by_callback(&access_token, &url).await?
            }
            None => {
                let mut summary = entry.summary;
                summary.insert("userId".to_string(), Value::String(entry.user_id));
                vec![Value::Object(summary)]
            }
        };

        let mut ingested = 0;
        for raw in raw_activities {
            let outcome = self
                .ingestor
                .ingest(Provider::Garmin, raw, &credential.athlete_id)
                .await?;
            self.notify_if_new(&credential.athlete_id, &outcome).await;
            ingested += 1;
        }
        Ok(Some(ingested))
    }

    /// Fetch one activity by ID and run it through the pipeline.
    async fn fetch_one(
        &self,
        provider_athlete_id: &str,
        external_id: &str,
        is_new: bool,
    ) -> Result<EventOutcome, SyncError> {
        let provider = Provider::Strava;
        let Some(credential) = self
            .connected_credential(provider, provider_athlete_id)
            .await?
        else {
            return Ok(EventOutcome::NotConnected);
        };
        let athlete_id = credential.athlete_id.as_str();

        let access_token = match self.tokens.live_access_token(provider, athlete_id).await {
            Err(SyncError::NotConnected(_)) => return Ok(EventOutcome::NotConnected),
            other => other?,
        };
        let client = self.providers.get(provider)?;

        let raw = if is_new {
            let (raw, athlete) = tokio::join!(
                client.fetch_activity(&access_token, external_id),
                client.fetch_athlete(&access_token)
            );
            match athlete {
                Ok(athlete) => self.store_profile(&credential, athlete).await,
                Err(e) => {
                    tracing::warn!(athlete_id, error = %e, "Failed to fetch athlete profile")
                }
            }
            raw?
        } else {
            client.fetch_activity(&access_token, external_id).await?
        };

        let outcome = self.ingestor.ingest(provider, raw, athlete_id).await?;
        if is_new {
            self.notify_if_new(athlete_id, &outcome).await;
        }
        Ok(EventOutcome::Ingested(outcome.action))
    }

    async fn deauthorize(
        &self,
        provider: Provider,
        provider_athlete_id: &str,
    ) -> Result<EventOutcome, SyncError> {
        let Some(credential) = self
            .tokens
            .find_by_provider_athlete(provider, provider_athlete_id)
            .await?
        else {
            tracing::info!(%provider, provider_athlete_id, "Deauthorization for unknown athlete");
            return Ok(EventOutcome::Deauthorized { cleared: false });
        };

        let cleared = self
            .tokens
            .disconnect(provider, &credential.athlete_id)
            .await?;
        Ok(EventOutcome::Deauthorized { cleared })
    }

    async fn connected_credential(
        &self,
        provider: Provider,
        provider_athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError> {
        let credential = self
            .tokens
            .find_by_provider_athlete(provider, provider_athlete_id)
            .await?
            .filter(|c| c.connected);
        if credential.is_none() {
            tracing::info!(%provider, provider_athlete_id, "Event for disconnected athlete, ignoring");
        }
        Ok(credential)
    }

    async fn store_profile(&self, credential: &OAuthCredential, athlete: ProviderAthlete) {
        let profile = AthleteProfile {
            athlete_id: credential.athlete_id.clone(),
            provider: credential.provider,
            provider_athlete_id: athlete.provider_athlete_id,
            firstname: athlete.firstname,
            lastname: athlete.lastname,
            profile_picture: athlete.profile_picture,
            city: athlete.city,
            country: athlete.country,
            sex: athlete.sex,
            weight: athlete.weight,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.store.upsert_athlete(&profile).await {
            tracing::warn!(
                athlete_id = %credential.athlete_id,
                error = %e,
                "Failed to store athlete profile, continuing anyway"
            );
        }
    }

    async fn notify_if_new(&self, athlete_id: &str, outcome: &IngestOutcome) {
        if outcome.action == IngestAction::Updated {
            return;
        }
        if let Err(e) = self
            .notifier
            .activity_synced(athlete_id, &outcome.activity)
            .await
        {
            tracing::warn!(athlete_id, error = %e, "Failed to send activity notification");
        }
    }
}
