// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Credentials (encrypted OAuth tokens)
//! - Activities (canonical, reconciled records)
//! - Athletes (provider profiles)
//! - Sync jobs (background queue)

use crate::db::{collections, SyncStore};
use crate::error::SyncError;
use crate::models::{
    Activity, ActivitySource, AthleteProfile, JobTransition, OAuthCredential, Provider, SyncJob,
    SyncJobStatus,
};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::FirestoreQueryDirection;
use futures_util::FutureExt;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

fn db_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Persistence(e.to_string())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, SyncError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            SyncError::Persistence(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, SyncError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            SyncError::Persistence(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, SyncError> {
        self.client.as_ref().ok_or_else(|| {
            SyncError::Persistence("Database not connected (offline mode)".to_string())
        })
    }

    /// Batch delete documents by ID using transactions.
    async fn batch_delete(&self, collection: &str, doc_ids: &[String]) -> Result<(), SyncError> {
        let client = self.get_client()?;

        for chunk in doc_ids.chunks(BATCH_SIZE) {
            let mut transaction = client.begin_transaction().await.map_err(|e| {
                SyncError::Persistence(format!("Failed to begin transaction: {}", e))
            })?;

            for doc_id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        SyncError::Persistence(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                SyncError::Persistence(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl SyncStore for FirestoreDb {
    // ─── Credential Operations ───────────────────────────────────

    async fn get_credential(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(&OAuthCredential::doc_id(provider, athlete_id))
            .await
            .map_err(db_err)
    }

    async fn find_credential_by_provider_athlete(
        &self,
        provider: Provider,
        provider_athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError> {
        let provider_athlete_id = provider_athlete_id.to_string();
        let matches: Vec<OAuthCredential> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CREDENTIALS)
            .filter(move |q| {
                q.for_all([
                    q.field("provider").eq(provider.as_str()),
                    q.field("provider_athlete_id").eq(provider_athlete_id.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        Ok(matches.into_iter().next())
    }

    async fn save_credential(&self, credential: &OAuthCredential) -> Result<(), SyncError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(OAuthCredential::doc_id(
                credential.provider,
                &credential.athlete_id,
            ))
            .object(credential)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Same read-through-transaction shape as [`Self::transition_job`], so a
    /// disconnect that lands mid-refresh aborts the write.
    async fn save_refreshed_credential(
        &self,
        credential: &OAuthCredential,
    ) -> Result<bool, SyncError> {
        let doc_id = OAuthCredential::doc_id(credential.provider, &credential.athlete_id);
        let credential = credential.clone();

        self.get_client()?
            .run_transaction(|db, transaction| {
                let doc_id = doc_id.clone();
                let credential = credential.clone();
                async move {
                    let current: Option<OAuthCredential> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::CREDENTIALS)
                        .obj()
                        .one(&doc_id)
                        .await?;

                    if !current.is_some_and(|c| c.connected) {
                        return Ok(false);
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::CREDENTIALS)
                        .document_id(&doc_id)
                        .object(&credential)
                        .add_to_transaction(transaction)?;

                    Ok(true)
                }
                .boxed()
            })
            .await
            .map_err(|e| SyncError::Persistence(format!("Credential refresh write failed: {}", e)))
    }

    async fn clear_credential(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<bool, SyncError> {
        let Some(mut credential) = self.get_credential(provider, athlete_id).await? else {
            return Ok(false);
        };
        credential.clear();
        self.save_credential(&credential).await?;
        Ok(true)
    }

    // ─── Activity Operations ─────────────────────────────────────

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>, SyncError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(id)
            .await
            .map_err(db_err)
    }

    async fn find_activity_by_source(
        &self,
        athlete_id: &str,
        source: ActivitySource,
        external_id: &str,
    ) -> Result<Option<Activity>, SyncError> {
        let athlete_id = athlete_id.to_string();
        let key = source.key(external_id);
        let matches: Vec<Activity> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("athlete_id").eq(athlete_id.clone()),
                    q.field("source_keys").array_contains(key.clone()),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        Ok(matches.into_iter().next())
    }

    async fn activities_in_window(
        &self,
        athlete_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, SyncError> {
        let athlete_id = athlete_id.to_string();
        let from = format_utc_rfc3339(from);
        let to = format_utc_rfc3339(to);
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("athlete_id").eq(athlete_id.clone()),
                    q.field("start_time").greater_than_or_equal(from.clone()),
                    q.field("start_time").less_than_or_equal(to.clone()),
                ])
            })
            .order_by([("start_time", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    async fn latest_start_time(
        &self,
        athlete_id: &str,
        source: ActivitySource,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        let athlete_id = athlete_id.to_string();
        let newest: Vec<Activity> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("athlete_id").eq(athlete_id.clone()),
                    q.field("source").eq(source.as_str()),
                ])
            })
            .order_by([("start_time", FirestoreQueryDirection::Descending)])
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        Ok(newest.into_iter().next().map(|a| a.start_time))
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<(), SyncError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(&activity.id)
            .object(activity)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ─── Athlete Operations ──────────────────────────────────────

    async fn upsert_athlete(&self, profile: &AthleteProfile) -> Result<(), SyncError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ATHLETES)
            .document_id(profile.doc_id())
            .object(profile)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ─── Sync Job Operations ─────────────────────────────────────

    async fn create_job(&self, job: &SyncJob) -> Result<(), SyncError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SYNC_JOBS)
            .document_id(&job.id)
            .object(job)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<SyncJob>, SyncError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SYNC_JOBS)
            .obj()
            .one(id)
            .await
            .map_err(db_err)
    }

    async fn list_pending_jobs(&self, limit: u32) -> Result<Vec<SyncJob>, SyncError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SYNC_JOBS)
            .filter(|q| q.for_all([q.field("status").eq(SyncJobStatus::Pending.as_str())]))
            .order_by([("created_at", FirestoreQueryDirection::Ascending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    async fn list_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<SyncJob>, SyncError> {
        let cutoff = format_utc_rfc3339(cutoff);
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SYNC_JOBS)
            .filter(move |q| {
                q.for_all([
                    q.field("status").eq(SyncJobStatus::InProgress.as_str()),
                    q.field("started_at").less_than(cutoff.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    /// Runs the transition inside a Firestore transaction. The job is read
    /// through the transaction so a concurrent writer forces a retry with
    /// fresh data.
    async fn transition_job(
        &self,
        id: &str,
        transition: &JobTransition,
    ) -> Result<Option<SyncJob>, SyncError> {
        let id = id.to_string();
        let transition = transition.clone();

        self.get_client()?
            .run_transaction(|db, transaction| {
                let id = id.clone();
                let transition = transition.clone();
                async move {
                    let current: Option<SyncJob> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::SYNC_JOBS)
                        .obj()
                        .one(&id)
                        .await?;

                    let Some(mut job) = current else {
                        return Ok(None);
                    };
                    if !transition.apply(&mut job) {
                        return Ok(None);
                    }

                    db.fluent()
                        .update()
                        .in_col(collections::SYNC_JOBS)
                        .document_id(&id)
                        .object(&job)
                        .add_to_transaction(transaction)?;

                    Ok(Some(job))
                }
                .boxed()
            })
            .await
            .map_err(|e| SyncError::Persistence(format!("Job transition failed: {}", e)))
    }

    async fn purge_terminal_jobs(&self, before: DateTime<Utc>) -> Result<u32, SyncError> {
        let before = format_utc_rfc3339(before);
        let mut doc_ids = Vec::new();

        for status in [SyncJobStatus::Completed, SyncJobStatus::Failed] {
            let before = before.clone();
            let expired: Vec<SyncJob> = self
                .get_client()?
                .fluent()
                .select()
                .from(collections::SYNC_JOBS)
                .filter(move |q| {
                    q.for_all([
                        q.field("status").eq(status.as_str()),
                        q.field("completed_at").less_than(before.clone()),
                    ])
                })
                .obj()
                .query()
                .await
                .map_err(db_err)?;
            doc_ids.extend(expired.into_iter().map(|job| job.id));
        }

        self.batch_delete(collections::SYNC_JOBS, &doc_ids).await?;

        tracing::info!(count = doc_ids.len(), "Purged expired sync jobs");
        Ok(doc_ids.len() as u32)
    }
}
