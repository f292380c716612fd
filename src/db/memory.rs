// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process datastore.
//!
//! Used by tests and by `DATASTORE=memory` local runs. Every trait call bumps
//! an operation counter so tests can assert that a request never touched the
//! datastore.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{
    Activity, ActivitySource, AthleteProfile, JobTransition, OAuthCredential, Provider, SyncJob,
    SyncJobStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    activities: DashMap<String, Activity>,
    credentials: DashMap<String, OAuthCredential>,
    athletes: DashMap<String, AthleteProfile>,
    jobs: DashMap<String, SyncJob>,
    operations: AtomicU64,
    /// Activity IDs whose writes fail (tests only).
    failing_activity_ids: DashMap<String, ()>,
    /// Fail every credential write (tests only).
    credential_writes_fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of datastore calls made so far.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Make writes of the given activity ID fail with a persistence error.
    pub fn fail_writes_for(&self, activity_id: impl Into<String>) {
        self.failing_activity_ids.insert(activity_id.into(), ());
    }

    /// Make every credential write fail with a persistence error.
    pub fn fail_credential_writes(&self) {
        self.credential_writes_fail.store(true, Ordering::SeqCst);
    }

    fn check_credential_write(&self) -> Result<(), SyncError> {
        if self.credential_writes_fail.load(Ordering::SeqCst) {
            return Err(SyncError::Persistence(
                "simulated credential write failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot of every stored activity for one athlete.
    pub fn activities_for(&self, athlete_id: &str) -> Vec<Activity> {
        let mut out: Vec<Activity> = self
            .activities
            .iter()
            .filter(|a| a.athlete_id == athlete_id)
            .map(|a| a.value().clone())
            .collect();
        out.sort_by_key(|a| a.start_time);
        out
    }

    pub fn athlete(&self, provider: Provider, athlete_id: &str) -> Option<AthleteProfile> {
        self.athletes
            .get(&OAuthCredential::doc_id(provider, athlete_id))
            .map(|p| p.value().clone())
    }

    fn op(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get_credential(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError> {
        self.op();
        Ok(self
            .credentials
            .get(&OAuthCredential::doc_id(provider, athlete_id))
            .map(|c| c.value().clone()))
    }

    async fn find_credential_by_provider_athlete(
        &self,
        provider: Provider,
        provider_athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError> {
        self.op();
        Ok(self
            .credentials
            .iter()
            .find(|c| c.provider == provider && c.provider_athlete_id == provider_athlete_id)
            .map(|c| c.value().clone()))
    }

    async fn save_credential(&self, credential: &OAuthCredential) -> Result<(), SyncError> {
        self.op();
        self.check_credential_write()?;
        self.credentials.insert(
            OAuthCredential::doc_id(credential.provider, &credential.athlete_id),
            credential.clone(),
        );
        Ok(())
    }

    async fn save_refreshed_credential(
        &self,
        credential: &OAuthCredential,
    ) -> Result<bool, SyncError> {
        self.op();
        self.check_credential_write()?;
        let Some(mut stored) = self
            .credentials
            .get_mut(&OAuthCredential::doc_id(credential.provider, &credential.athlete_id))
        else {
            return Ok(false);
        };
        if !stored.connected {
            return Ok(false);
        }
        *stored = credential.clone();
        Ok(true)
    }

    async fn clear_credential(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<bool, SyncError> {
        self.op();
        self.check_credential_write()?;
        match self
            .credentials
            .get_mut(&OAuthCredential::doc_id(provider, athlete_id))
        {
            Some(mut credential) => {
                credential.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>, SyncError> {
        self.op();
        Ok(self.activities.get(id).map(|a| a.value().clone()))
    }

    async fn find_activity_by_source(
        &self,
        athlete_id: &str,
        source: ActivitySource,
        external_id: &str,
    ) -> Result<Option<Activity>, SyncError> {
        self.op();
        Ok(self
            .activities
            .iter()
            .find(|a| a.athlete_id == athlete_id && a.answers_to(source, external_id))
            .map(|a| a.value().clone()))
    }

    async fn activities_in_window(
        &self,
        athlete_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, SyncError> {
        self.op();
        let mut out: Vec<Activity> = self
            .activities
            .iter()
            .filter(|a| a.athlete_id == athlete_id && a.start_time >= from && a.start_time <= to)
            .map(|a| a.value().clone())
            .collect();
        out.sort_by_key(|a| a.start_time);
        Ok(out)
    }

    async fn latest_start_time(
        &self,
        athlete_id: &str,
        source: ActivitySource,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.op();
        Ok(self
            .activities
            .iter()
            .filter(|a| a.athlete_id == athlete_id && a.source == source)
            .map(|a| a.start_time)
            .max())
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<(), SyncError> {
        self.op();
        if self.failing_activity_ids.contains_key(&activity.id) {
            return Err(SyncError::Persistence(format!(
                "simulated write failure for {}",
                activity.id
            )));
        }
        self.activities.insert(activity.id.clone(), activity.clone());
        Ok(())
    }

    async fn upsert_athlete(&self, profile: &AthleteProfile) -> Result<(), SyncError> {
        self.op();
        self.athletes.insert(profile.doc_id(), profile.clone());
        Ok(())
    }

    async fn create_job(&self, job: &SyncJob) -> Result<(), SyncError> {
        self.op();
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<SyncJob>, SyncError> {
        self.op();
        Ok(self.jobs.get(id).map(|j| j.value().clone()))
    }

    async fn list_pending_jobs(&self, limit: u32) -> Result<Vec<SyncJob>, SyncError> {
        self.op();
        let mut pending: Vec<SyncJob> = self
            .jobs
            .iter()
            .filter(|j| j.status == SyncJobStatus::Pending)
            .map(|j| j.value().clone())
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn list_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<SyncJob>, SyncError> {
        self.op();
        Ok(self
            .jobs
            .iter()
            .filter(|j| {
                j.status == SyncJobStatus::InProgress
                    && j.started_at.is_none_or(|started| started < cutoff)
            })
            .map(|j| j.value().clone())
            .collect())
    }

    async fn transition_job(
        &self,
        id: &str,
        transition: &JobTransition,
    ) -> Result<Option<SyncJob>, SyncError> {
        self.op();
        // The entry guard holds the shard lock for the whole read-check-write.
        let Some(mut job) = self.jobs.get_mut(id) else {
            return Ok(None);
        };
        if transition.apply(&mut job) {
            Ok(Some(job.clone()))
        } else {
            Ok(None)
        }
    }

    async fn purge_terminal_jobs(&self, before: DateTime<Utc>) -> Result<u32, SyncError> {
        self.op();
        let expired: Vec<String> = self
            .jobs
            .iter()
            .filter(|j| j.status.is_terminal() && j.completed_at.is_some_and(|at| at < before))
            .map(|j| j.key().clone())
            .collect();
        for id in &expired {
            self.jobs.remove(id);
        }
        Ok(expired.len() as u32)
    }
}
