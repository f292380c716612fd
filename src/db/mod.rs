// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Everything above this module talks to a [`SyncStore`]; Firestore is the
//! production backend and [`MemoryStore`] backs tests and local runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::SyncError;
use crate::models::{
    Activity, ActivitySource, AthleteProfile, JobTransition, OAuthCredential, Provider, SyncJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const ACTIVITIES: &str = "activities";
    /// Encrypted OAuth tokens (keyed by provider + athlete)
    pub const CREDENTIALS: &str = "credentials";
    /// Provider athlete profiles
    pub const ATHLETES: &str = "athletes";
    pub const SYNC_JOBS: &str = "sync_jobs";
}

/// Persistence operations used by the sync engine and webhook ingestor.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // ─── Credentials ─────────────────────────────────────────────

    async fn get_credential(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError>;

    /// Look up a credential by the athlete's provider-side ID.
    async fn find_credential_by_provider_athlete(
        &self,
        provider: Provider,
        provider_athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError>;

    async fn save_credential(&self, credential: &OAuthCredential) -> Result<(), SyncError>;

    /// Overwrite the stored credential only if it is still connected.
    /// Returns false, writing nothing, if it was disconnected or removed.
    async fn save_refreshed_credential(
        &self,
        credential: &OAuthCredential,
    ) -> Result<bool, SyncError>;

    /// Wipe tokens and mark disconnected. Returns false if there was nothing
    /// to clear.
    async fn clear_credential(&self, provider: Provider, athlete_id: &str)
        -> Result<bool, SyncError>;

    // ─── Activities ──────────────────────────────────────────────

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>, SyncError>;

    /// Find the record that answers to `(source, external_id)`, whether as
    /// its primary report or a merged one.
    async fn find_activity_by_source(
        &self,
        athlete_id: &str,
        source: ActivitySource,
        external_id: &str,
    ) -> Result<Option<Activity>, SyncError>;

    /// Activities whose start time lies in `[from, to]`.
    async fn activities_in_window(
        &self,
        athlete_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, SyncError>;

    /// Newest stored start time for one athlete and source.
    async fn latest_start_time(
        &self,
        athlete_id: &str,
        source: ActivitySource,
    ) -> Result<Option<DateTime<Utc>>, SyncError>;

    /// Insert or overwrite by `activity.id`.
    async fn upsert_activity(&self, activity: &Activity) -> Result<(), SyncError>;

    // ─── Athletes ────────────────────────────────────────────────

    async fn upsert_athlete(&self, profile: &AthleteProfile) -> Result<(), SyncError>;

    // ─── Sync Jobs ───────────────────────────────────────────────

    async fn create_job(&self, job: &SyncJob) -> Result<(), SyncError>;

    async fn get_job(&self, id: &str) -> Result<Option<SyncJob>, SyncError>;

    /// Oldest pending jobs first.
    async fn list_pending_jobs(&self, limit: u32) -> Result<Vec<SyncJob>, SyncError>;

    /// In-progress jobs that started before `cutoff`.
    async fn list_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<SyncJob>, SyncError>;

    /// Apply a conditional transition atomically. Returns the updated job,
    /// or `None` if the job is missing or not in the required state.
    async fn transition_job(
        &self,
        id: &str,
        transition: &JobTransition,
    ) -> Result<Option<SyncJob>, SyncError>;

    /// Delete completed/failed jobs that finished before `before`.
    async fn purge_terminal_jobs(&self, before: DateTime<Utc>) -> Result<u32, SyncError>;
}
