// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background sync job record.

use crate::models::Provider;
use crate::time_utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle state.
///
/// `pending -> in_progress -> {completed | failed}`, with `in_progress ->
/// pending` on staleness recovery while retries remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "pending",
            SyncJobStatus::InProgress => "in_progress",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncJobStatus::Completed | SyncJobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Everything in the requested window
    Full,
    /// Only activities newer than what is already stored
    Incremental,
}

/// Free-form job metadata. `max_activities` caps the fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_activities: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Stored sync job in Firestore (`sync_jobs` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub athlete_id: String,
    #[serde(default)]
    pub provider: Provider,
    pub sync_type: SyncKind,
    #[serde(default, with = "time_utils::rfc3339_opt")]
    pub after: Option<DateTime<Utc>>,
    #[serde(default, with = "time_utils::rfc3339_opt")]
    pub before: Option<DateTime<Utc>>,
    pub status: SyncJobStatus,

    #[serde(with = "time_utils::rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "time_utils::rfc3339_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "time_utils::rfc3339_opt")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub total_activities: u32,
    #[serde(default)]
    pub processed_activities: u32,
    #[serde(default)]
    pub failed_activities: u32,
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub metadata: JobMetadata,
}

impl SyncJob {
    /// Build a new pending job.
    pub fn new(
        athlete_id: impl Into<String>,
        provider: Provider,
        sync_type: SyncKind,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        metadata: JobMetadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            athlete_id: athlete_id.into(),
            provider,
            sync_type,
            after,
            before,
            status: SyncJobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_activities: 0,
            processed_activities: 0,
            failed_activities: 0,
            error_message: None,
            retry_count: 0,
            metadata,
        }
    }
}

/// Counters written while a job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobProgress {
    pub total: u32,
    pub processed: u32,
    pub failed: u32,
}

/// Outcome of a staleness reset on one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleOutcome {
    /// Back to `pending` with the retry count bumped
    Requeued,
    /// Retry cap reached, now `failed`
    Failed,
    /// The job moved on before we could reset it
    Skipped,
}

/// A conditional state change on one job.
///
/// Datastores apply these as a single read-check-write so that the claim
/// step and the staleness sweep can race on a row without double-processing.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// `pending -> in_progress`
    Claim { now: DateTime<Utc> },
    /// Counter update on an `in_progress` job
    Progress(JobProgress),
    /// `in_progress -> completed`
    Complete {
        progress: JobProgress,
        now: DateTime<Utc>,
    },
    /// `in_progress -> failed`
    Fail {
        progress: JobProgress,
        message: String,
        now: DateTime<Utc>,
    },
    /// `in_progress -> pending` (retry count + 1), or `failed` at the cap
    Retry {
        message: String,
        max_retries: u32,
        now: DateTime<Utc>,
    },
    /// Same as `Retry`, but only if the job started before `cutoff`
    RecoverStale {
        cutoff: DateTime<Utc>,
        max_retries: u32,
        now: DateTime<Utc>,
    },
}

impl JobTransition {
    /// Apply to `job` in place. Returns false (leaving `job` untouched) when
    /// the job is not in the state this transition requires.
    pub fn apply(&self, job: &mut SyncJob) -> bool {
        match self {
            JobTransition::Claim { now } => {
                if job.status != SyncJobStatus::Pending {
                    return false;
                }
                job.status = SyncJobStatus::InProgress;
                job.started_at = Some(*now);
                job.completed_at = None;
                job.total_activities = 0;
                job.processed_activities = 0;
                job.failed_activities = 0;
            }
            JobTransition::Progress(progress) => {
                if job.status != SyncJobStatus::InProgress {
                    return false;
                }
                set_counters(job, progress);
            }
            JobTransition::Complete { progress, now } => {
                if job.status != SyncJobStatus::InProgress {
                    return false;
                }
                set_counters(job, progress);
                job.status = SyncJobStatus::Completed;
                job.completed_at = Some(*now);
                job.error_message = None;
            }
            JobTransition::Fail {
                progress,
                message,
                now,
            } => {
                if job.status != SyncJobStatus::InProgress {
                    return false;
                }
                set_counters(job, progress);
                job.status = SyncJobStatus::Failed;
                job.completed_at = Some(*now);
                job.error_message = Some(message.clone());
            }
            JobTransition::Retry {
                message,
                max_retries,
                now,
            } => {
                if job.status != SyncJobStatus::InProgress {
                    return false;
                }
                retry_or_fail(job, message.clone(), *max_retries, *now);
            }
            JobTransition::RecoverStale {
                cutoff,
                max_retries,
                now,
            } => {
                if job.status != SyncJobStatus::InProgress {
                    return false;
                }
                if job.started_at.is_some_and(|started| started >= *cutoff) {
                    return false;
                }
                let message = format!(
                    "Job exceeded staleness threshold (retry {} of {})",
                    job.retry_count + 1,
                    max_retries
                );
                retry_or_fail(job, message, *max_retries, *now);
            }
        }
        true
    }
}

fn set_counters(job: &mut SyncJob, progress: &JobProgress) {
    job.total_activities = progress.total;
    job.processed_activities = progress.processed;
    job.failed_activities = progress.failed;
}

fn retry_or_fail(job: &mut SyncJob, message: String, max_retries: u32, now: DateTime<Utc>) {
    if job.retry_count >= max_retries {
        job.status = SyncJobStatus::Failed;
        job.completed_at = Some(now);
        job.error_message = Some(format!("{message}; retry limit reached"));
    } else {
        job.status = SyncJobStatus::Pending;
        job.retry_count += 1;
        job.started_at = None;
        job.error_message = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn in_progress(started_minutes_ago: i64, retry_count: u32) -> SyncJob {
        let mut job = SyncJob::new(
            "athlete-1",
            Provider::Strava,
            SyncKind::Full,
            None,
            None,
            JobMetadata::default(),
        );
        job.status = SyncJobStatus::InProgress;
        job.started_at = Some(Utc::now() - Duration::minutes(started_minutes_ago));
        job.retry_count = retry_count;
        job
    }

    fn recover(job: &mut SyncJob) -> bool {
        let now = Utc::now();
        JobTransition::RecoverStale {
            cutoff: now - Duration::minutes(30),
            max_retries: 3,
            now,
        }
        .apply(job)
    }

    #[test]
    fn stale_job_below_cap_is_requeued() {
        let mut job = in_progress(31, 2);
        assert!(recover(&mut job));
        assert_eq!(job.status, SyncJobStatus::Pending);
        assert_eq!(job.retry_count, 3);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn stale_job_at_cap_fails() {
        let mut job = in_progress(45, 3);
        assert!(recover(&mut job));
        assert_eq!(job.status, SyncJobStatus::Failed);
        assert_eq!(job.retry_count, 3);
        assert!(job.completed_at.is_some());
        assert!(job.error_message.unwrap().contains("retry limit"));
    }

    #[test]
    fn fresh_job_is_not_stale() {
        let mut job = in_progress(5, 0);
        let before = job.clone();
        assert!(!recover(&mut job));
        assert_eq!(job, before);
    }

    #[test]
    fn claim_requires_pending() {
        let mut job = in_progress(1, 0);
        assert!(!JobTransition::Claim { now: Utc::now() }.apply(&mut job));

        let mut job = SyncJob::new(
            "athlete-1",
            Provider::Strava,
            SyncKind::Incremental,
            None,
            None,
            JobMetadata::default(),
        );
        let now = Utc::now();
        assert!(JobTransition::Claim { now }.apply(&mut job));
        assert_eq!(job.status, SyncJobStatus::InProgress);
        assert_eq!(job.started_at, Some(now));
    }

    #[test]
    fn completed_job_cannot_be_recovered_or_failed() {
        let mut job = in_progress(60, 0);
        let now = Utc::now();
        let progress = JobProgress {
            total: 3,
            processed: 2,
            failed: 1,
        };
        assert!(JobTransition::Complete { progress, now }.apply(&mut job));
        assert_eq!(job.total_activities, 3);
        assert_eq!(job.failed_activities, 1);

        assert!(!recover(&mut job));
        assert!(!JobTransition::Fail {
            progress,
            message: "late".to_string(),
            now,
        }
        .apply(&mut job));
        assert_eq!(job.status, SyncJobStatus::Completed);
    }

    #[test]
    fn metadata_keeps_unknown_keys() {
        let raw = serde_json::json!({"max_activities": 20, "tier": "free"});
        let meta: JobMetadata = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(meta.max_activities, Some(20));
        assert_eq!(meta.extra["tier"], "free");
        assert_eq!(serde_json::to_value(&meta).unwrap(), raw);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(SyncJobStatus::InProgress).unwrap(),
            "in_progress"
        );
        assert!(SyncJobStatus::Failed.is_terminal());
        assert!(!SyncJobStatus::Pending.is_terminal());
    }

    #[test]
    fn missing_provider_defaults_to_strava() {
        let job = SyncJob::new(
            "a1",
            Provider::Garmin,
            SyncKind::Full,
            None,
            None,
            JobMetadata::default(),
        );
        let mut value = serde_json::to_value(&job).unwrap();
        value.as_object_mut().unwrap().remove("provider");
        let back: SyncJob = serde_json::from_value(value).unwrap();
        assert_eq!(back.provider, Provider::Strava);
    }
}
