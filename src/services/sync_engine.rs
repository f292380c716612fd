// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background sync job engine.
//!
//! Driven by scheduler ticks:
//! - `run_tick` claims the oldest pending jobs and drives each to a
//!   terminal (or re-queued) state
//! - `sweep_stale` recovers jobs stuck in `in_progress`
//! - `purge_expired` removes terminal jobs past retention
//!
//! Every state change is a conditional [`JobTransition`], so a tick and a
//! sweep racing on the same job cannot both win.

use crate::config::Config;
use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{
    ActivitySource, JobProgress, JobTransition, StaleOutcome, SyncJob, SyncJobStatus, SyncKind,
};
use crate::services::credentials::TokenManager;
use crate::services::ingest::ActivityIngestor;
use crate::services::provider::{fetch_activities, FetchWindow, ProviderRegistry};
use chrono::{Duration, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// Jobs from one tick processed concurrently.
const MAX_CONCURRENT_JOBS: usize = 2;

/// Persist counters after this many activities.
pub const PROGRESS_INTERVAL: usize = 25;

/// Engine tunables, normally taken from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub batch_size: u32,
    pub stale_after: Duration,
    pub max_retries: u32,
    pub retention: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.sync_batch_size,
            stale_after: config.stale_job_after,
            max_retries: config.max_job_retries,
            retention: config.job_retention,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            stale_after: Duration::minutes(30),
            max_retries: 3,
            retention: Duration::days(30),
        }
    }
}

/// How one claimed job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobProgress),
    Failed(String),
    /// Back to `pending` for another attempt.
    Requeued,
    /// The job left `in_progress` under us (swept) or its final state could
    /// not be written; the staleness sweep owns it now.
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub claimed: u32,
    pub completed: u32,
    pub failed: u32,
    pub requeued: u32,
    pub abandoned: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub requeued: u32,
    pub failed: u32,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    providers: ProviderRegistry,
    tokens: TokenManager,
    ingestor: ActivityIngestor,
    settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn SyncStore>,
        providers: ProviderRegistry,
        tokens: TokenManager,
        ingestor: ActivityIngestor,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            providers,
            tokens,
            ingestor,
            settings,
        }
    }

    /// Persist a new pending job.
    pub async fn enqueue(&self, job: SyncJob) -> Result<SyncJob, SyncError> {
        self.store.create_job(&job).await?;
        tracing::info!(
            job_id = %job.id,
            athlete_id = %job.athlete_id,
            provider = %job.provider,
            sync_type = ?job.sync_type,
            "Sync job created"
        );
        Ok(job)
    }

    /// Claim up to `batch_size` pending jobs and run them.
    pub async fn run_tick(&self) -> Result<TickReport, SyncError> {
        let pending = self
            .store
            .list_pending_jobs(self.settings.batch_size)
            .await?;

        let mut claimed = Vec::with_capacity(pending.len());
        for job in pending {
            let claim = JobTransition::Claim { now: Utc::now() };
            match self.store.transition_job(&job.id, &claim).await {
                Ok(Some(job)) => claimed.push(job),
                Ok(None) => tracing::debug!(job_id = %job.id, "Job claimed elsewhere, skipping"),
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Failed to claim job"),
            }
        }

        let mut report = TickReport {
            claimed: claimed.len() as u32,
            ..Default::default()
        };

        let outcomes: Vec<JobOutcome> = stream::iter(claimed)
            .map(|job| self.run_job(job))
            .buffer_unordered(MAX_CONCURRENT_JOBS)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                JobOutcome::Completed(_) => report.completed += 1,
                JobOutcome::Failed(_) => report.failed += 1,
                JobOutcome::Requeued => report.requeued += 1,
                JobOutcome::Abandoned => report.abandoned += 1,
            }
        }

        tracing::info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            requeued = report.requeued,
            abandoned = report.abandoned,
            "Sync tick finished"
        );
        Ok(report)
    }

    /// Drive one claimed (`in_progress`) job to its next state.
    pub async fn run_job(&self, job: SyncJob) -> JobOutcome {
        let outcome = match self.execute(&job).await {
            Ok(Some(progress)) => {
                let done = JobTransition::Complete {
                    progress,
                    now: Utc::now(),
                };
                self.finish(&job, done, JobOutcome::Completed(progress))
                    .await
            }
            Ok(None) => JobOutcome::Abandoned,
            Err(e) if e.is_retryable() => {
                let retry = JobTransition::Retry {
                    message: e.to_string(),
                    max_retries: self.settings.max_retries,
                    now: Utc::now(),
                };
                match self.store.transition_job(&job.id, &retry).await {
                    Ok(Some(updated)) if updated.status == SyncJobStatus::Pending => {
                        JobOutcome::Requeued
                    }
                    Ok(Some(updated)) => {
                        JobOutcome::Failed(updated.error_message.unwrap_or_default())
                    }
                    Ok(None) => JobOutcome::Abandoned,
                    Err(write_err) => {
                        tracing::error!(job_id = %job.id, error = %write_err, "Failed to requeue job");
                        JobOutcome::Abandoned
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                let fail = JobTransition::Fail {
                    progress: JobProgress::default(),
                    message: message.clone(),
                    now: Utc::now(),
                };
                self.finish(&job, fail, JobOutcome::Failed(message)).await
            }
        };

        match &outcome {
            JobOutcome::Completed(progress) => tracing::info!(
                job_id = %job.id,
                athlete_id = %job.athlete_id,
                total = progress.total,
                processed = progress.processed,
                failed = progress.failed,
                "Sync job completed"
            ),
            JobOutcome::Failed(message) => tracing::warn!(
                job_id = %job.id,
                athlete_id = %job.athlete_id,
                error = %message,
                "Sync job failed"
            ),
            JobOutcome::Requeued => {
                tracing::info!(job_id = %job.id, "Sync job re-queued after transient error")
            }
            JobOutcome::Abandoned => {
                tracing::warn!(job_id = %job.id, "Sync job no longer owned by this run")
            }
        }
        outcome
    }

    async fn finish(
        &self,
        job: &SyncJob,
        transition: JobTransition,
        outcome: JobOutcome,
    ) -> JobOutcome {
        match self.store.transition_job(&job.id, &transition).await {
            Ok(Some(_)) => outcome,
            Ok(None) => JobOutcome::Abandoned,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record job result");
                JobOutcome::Abandoned
            }
        }
    }

    /// Fetch and ingest. `Ok(None)` means the job was taken away mid-run.
    ///
    /// Inside the per-activity loop only job-fatal errors escape; any other
    /// failing activity just bumps the failed counter.
    async fn execute(&self, job: &SyncJob) -> Result<Option<JobProgress>, SyncError> {
        let client = self.providers.get(job.provider)?;
        let access_token = self
            .tokens
            .live_access_token(job.provider, &job.athlete_id)
            .await?;
        let window = self.fetch_window(job).await?;

        let raw_activities = fetch_activities(
            client.as_ref(),
            &access_token,
            &window,
            job.metadata.max_activities,
        )
        .await?;

        let mut progress = JobProgress {
            total: raw_activities.len() as u32,
            ..Default::default()
        };
        if !self.write_progress(job, progress).await? {
            return Ok(None);
        }

        for (index, raw) in raw_activities.into_iter().enumerate() {
            match self.ingestor.ingest(job.provider, raw, &job.athlete_id).await {
                Ok(_) => progress.processed += 1,
                Err(e) if e.is_job_fatal() => return Err(e),
                Err(e) => {
                    progress.failed += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        athlete_id = %job.athlete_id,
                        index,
                        error = %e,
                        "Failed to ingest activity, continuing"
                    );
                }
            }

            if (index + 1) % PROGRESS_INTERVAL == 0 && !self.write_progress(job, progress).await? {
                return Ok(None);
            }
        }

        Ok(Some(progress))
    }

    async fn write_progress(&self, job: &SyncJob, progress: JobProgress) -> Result<bool, SyncError> {
        let updated = self
            .store
            .transition_job(&job.id, &JobTransition::Progress(progress))
            .await?;
        Ok(updated.is_some())
    }

    /// Incremental jobs without an explicit start resume after the newest
    /// activity already stored from this provider.
    async fn fetch_window(&self, job: &SyncJob) -> Result<FetchWindow, SyncError> {
        let after = match (job.sync_type, job.after) {
            (_, Some(after)) => Some(after),
            (SyncKind::Incremental, None) => {
                self.store
                    .latest_start_time(&job.athlete_id, ActivitySource::from(job.provider))
                    .await?
            }
            (SyncKind::Full, None) => None,
        };
        Ok(FetchWindow {
            after,
            before: job.before,
        })
    }

    /// Reset `in_progress` jobs that started before the staleness cutoff.
    pub async fn sweep_stale(&self) -> Result<SweepReport, SyncError> {
        let now = Utc::now();
        let cutoff = now - self.settings.stale_after;
        let stale = self.store.list_stale_jobs(cutoff).await?;

        let mut report = SweepReport::default();
        for job in stale {
            match self.recover(&job.id, cutoff).await {
                Ok(StaleOutcome::Requeued) => report.requeued += 1,
                Ok(StaleOutcome::Failed) => report.failed += 1,
                Ok(StaleOutcome::Skipped) => {}
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Failed to recover stale job"),
            }
        }

        if report.requeued + report.failed > 0 {
            tracing::info!(
                requeued = report.requeued,
                failed = report.failed,
                "Recovered stale sync jobs"
            );
        }
        Ok(report)
    }

    async fn recover(
        &self,
        job_id: &str,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<StaleOutcome, SyncError> {
        let transition = JobTransition::RecoverStale {
            cutoff,
            max_retries: self.settings.max_retries,
            now: Utc::now(),
        };
        let outcome = match self.store.transition_job(job_id, &transition).await? {
            Some(job) if job.status == SyncJobStatus::Pending => StaleOutcome::Requeued,
            Some(_) => StaleOutcome::Failed,
            None => StaleOutcome::Skipped,
        };
        tracing::debug!(job_id, ?outcome, "Stale job handled");
        Ok(outcome)
    }

    /// Delete terminal jobs that finished longer ago than the retention
    /// window.
    pub async fn purge_expired(&self) -> Result<u32, SyncError> {
        let before = Utc::now() - self.settings.retention;
        let purged = self.store.purge_terminal_jobs(before).await?;
        tracing::info!(purged, "Purged expired sync jobs");
        Ok(purged)
    }
}
