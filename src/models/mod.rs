// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod activity;
pub mod athlete;
pub mod credential;
pub mod discipline;
pub mod provider;
pub mod sync_job;

pub use activity::{Activity, MergedReport};
pub use athlete::AthleteProfile;
pub use credential::OAuthCredential;
pub use discipline::{Discipline, DisciplineLookup};
pub use provider::{ActivitySource, Provider};
pub use sync_job::{
    JobMetadata, JobProgress, JobTransition, StaleOutcome, SyncJob, SyncJobStatus, SyncKind,
};
