// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Normalize → reconcile → persist for one raw activity.
//!
//! Shared by the sync engine and the webhook ingestor. Re-ingesting a report
//! that is already stored (as a primary or merged report) updates the
//! existing record in place, so re-syncs are idempotent.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{Activity, DisciplineLookup, Provider};
use crate::services::normalize::normalize;
use crate::services::reconcile::{self, ReconcileAction, MATCH_WINDOW_SECS};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestAction {
    /// New canonical record.
    Inserted,
    /// Existing record refreshed from its own primary report.
    Updated,
    /// Report folded into another provider's record.
    Merged,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub action: IngestAction,
    /// The record as stored.
    pub activity: Activity,
}

#[derive(Clone)]
pub struct ActivityIngestor {
    store: Arc<dyn SyncStore>,
    lookup: DisciplineLookup,
}

impl ActivityIngestor {
    pub fn new(store: Arc<dyn SyncStore>, lookup: DisciplineLookup) -> Self {
        Self { store, lookup }
    }

    /// Ingest one raw provider payload for `athlete_id`.
    pub async fn ingest(
        &self,
        provider: Provider,
        raw: Value,
        athlete_id: &str,
    ) -> Result<IngestOutcome, SyncError> {
        let candidate = normalize(provider, raw, athlete_id, &self.lookup)?;
        self.store_candidate(candidate).await
    }

    async fn store_candidate(&self, candidate: Activity) -> Result<IngestOutcome, SyncError> {
        let now = Utc::now();

        if let Some(external_id) = candidate.external_id.as_deref() {
            let known = self
                .store
                .find_activity_by_source(&candidate.athlete_id, candidate.source, external_id)
                .await?;

            if let Some(mut existing) = known {
                let is_primary = existing.source == candidate.source
                    && existing.external_id == candidate.external_id;
                let (action, stored) = if is_primary {
                    (
                        IngestAction::Updated,
                        reconcile::refresh_primary(&existing, candidate, now),
                    )
                } else {
                    reconcile::merge(&mut existing, &candidate, now);
                    (IngestAction::Merged, existing)
                };
                self.store.upsert_activity(&stored).await?;
                tracing::debug!(
                    activity_id = %stored.id,
                    ?action,
                    "Re-ingested known activity report"
                );
                return Ok(IngestOutcome {
                    action,
                    activity: stored,
                });
            }
        }

        let window = Duration::seconds(MATCH_WINDOW_SECS);
        let nearby = self
            .store
            .activities_in_window(
                &candidate.athlete_id,
                candidate.start_time - window,
                candidate.start_time + window,
            )
            .await?;

        match reconcile::reconcile(&candidate, &nearby) {
            ReconcileAction::Insert => {
                self.store.upsert_activity(&candidate).await?;
                tracing::debug!(
                    activity_id = %candidate.id,
                    source = %candidate.source,
                    "Inserted activity"
                );
                Ok(IngestOutcome {
                    action: IngestAction::Inserted,
                    activity: candidate,
                })
            }
            ReconcileAction::MergeInto(target_id) => {
                let mut target = nearby
                    .into_iter()
                    .find(|a| a.id == target_id)
                    .ok_or_else(|| {
                        SyncError::Persistence(format!("merge target {} vanished", target_id))
                    })?;
                reconcile::merge(&mut target, &candidate, now);
                self.store.upsert_activity(&target).await?;
                tracing::info!(
                    activity_id = %target.id,
                    merged_source = %candidate.source,
                    merged_external_id = candidate.external_id.as_deref().unwrap_or(""),
                    "Merged duplicate activity report"
                );
                Ok(IngestOutcome {
                    action: IngestAction::Merged,
                    activity: target,
                })
            }
        }
    }
}
