// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential lifecycle: decrypt, refresh on demand, persist.
//!
//! Tokens are never cached in memory. Every call re-reads the credential so
//! a revoked or refreshed token is seen immediately. Refreshes for the same
//! `(provider, athlete)` are serialized within this process. A refreshed
//! pair is only written while the credential is still connected, so a
//! disconnect that lands mid-refresh wins.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{OAuthCredential, Provider};
use crate::services::kms::KmsService;
use crate::services::provider::{ProviderRegistry, TokenGrant};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Shared refresh locks keyed by credential document ID.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn SyncStore>,
    kms: KmsService,
    providers: ProviderRegistry,
    refresh_locks: RefreshLocks,
}

impl TokenManager {
    pub fn new(store: Arc<dyn SyncStore>, kms: KmsService, providers: ProviderRegistry) -> Self {
        Self {
            store,
            kms,
            providers,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// Get a live access token for the athlete, refreshing first if it
    /// expires within the margin.
    ///
    /// The refreshed pair is persisted before the new access token is
    /// returned. A rejected refresh leaves the stored credential untouched.
    pub async fn live_access_token(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<String, SyncError> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        let credential = self.connected_credential(provider, athlete_id).await?;
        if credential.is_live_at(Utc::now() + margin) {
            return self.decrypt(&credential, &credential.access_token_encrypted).await;
        }

        let key = OAuthCredential::doc_id(provider, athlete_id);
        let lock = self
            .refresh_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        let credential = self.connected_credential(provider, athlete_id).await?;
        if credential.is_live_at(Utc::now() + margin) {
            return self.decrypt(&credential, &credential.access_token_encrypted).await;
        }

        tracing::info!(%provider, athlete_id, "Access token expiring, refreshing");

        let refresh_token = self
            .decrypt(&credential, &credential.refresh_token_encrypted)
            .await?;
        let client = self.providers.get(provider)?;
        let grant = client.refresh(&refresh_token).await.map_err(|e| {
            tracing::warn!(%provider, athlete_id, error = %e, "Token refresh failed");
            e
        })?;

        let TokenGrant {
            access_token,
            refresh_token: new_refresh,
            expires_at,
        } = grant;
        let refresh_token = new_refresh.unwrap_or(refresh_token);

        let sealed = self
            .seal(credential, &access_token, &refresh_token, expires_at)
            .await?;
        if !self.store.save_refreshed_credential(&sealed).await? {
            tracing::info!(%provider, athlete_id, "Disconnected during refresh, discarding tokens");
            return Err(SyncError::NotConnected(athlete_id.to_string()));
        }

        tracing::info!(%provider, athlete_id, %expires_at, "Token refreshed and stored");
        Ok(access_token)
    }

    /// Store the token pair from a completed OAuth handshake, creating or
    /// reconnecting the credential.
    pub async fn save_tokens(
        &self,
        provider: Provider,
        athlete_id: &str,
        provider_athlete_id: &str,
        grant: TokenGrant,
        scopes: Vec<String>,
    ) -> Result<OAuthCredential, SyncError> {
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            SyncError::InvalidPayload(format!("{provider} grant has no refresh token"))
        })?;
        let credential = OAuthCredential {
            athlete_id: athlete_id.to_string(),
            provider,
            provider_athlete_id: provider_athlete_id.to_string(),
            access_token_encrypted: String::new(),
            refresh_token_encrypted: String::new(),
            expires_at: grant.expires_at,
            connected: true,
            scopes,
            updated_at: Utc::now(),
        };
        let sealed = self
            .seal(credential, &grant.access_token, &refresh_token, grant.expires_at)
            .await?;
        self.store.save_credential(&sealed).await?;
        Ok(sealed)
    }

    /// Clear the athlete's tokens and mark the credential disconnected.
    /// Returns false if no credential existed.
    pub async fn disconnect(&self, provider: Provider, athlete_id: &str) -> Result<bool, SyncError> {
        let cleared = self.store.clear_credential(provider, athlete_id).await?;
        self.refresh_locks
            .remove(&OAuthCredential::doc_id(provider, athlete_id));
        tracing::info!(%provider, athlete_id, cleared, "Credential disconnected");
        Ok(cleared)
    }

    /// Map a provider-side athlete ID to the stored credential.
    pub async fn find_by_provider_athlete(
        &self,
        provider: Provider,
        provider_athlete_id: &str,
    ) -> Result<Option<OAuthCredential>, SyncError> {
        self.store
            .find_credential_by_provider_athlete(provider, provider_athlete_id)
            .await
    }

    async fn connected_credential(
        &self,
        provider: Provider,
        athlete_id: &str,
    ) -> Result<OAuthCredential, SyncError> {
        match self.store.get_credential(provider, athlete_id).await? {
            Some(credential) if credential.connected => Ok(credential),
            _ => Err(SyncError::NotConnected(athlete_id.to_string())),
        }
    }

    /// Encrypt a token pair onto `credential` and mark it connected.
    async fn seal(
        &self,
        mut credential: OAuthCredential,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<OAuthCredential, SyncError> {
        let aad = OAuthCredential::doc_id(credential.provider, &credential.athlete_id);
        let (access, refresh) = self
            .kms
            .seal_pair(access_token, refresh_token, aad.as_bytes())
            .await?;

        credential.access_token_encrypted = access;
        credential.refresh_token_encrypted = refresh;
        credential.expires_at = expires_at;
        credential.connected = true;
        credential.updated_at = Utc::now();
        Ok(credential)
    }

    async fn decrypt(
        &self,
        credential: &OAuthCredential,
        ciphertext: &str,
    ) -> Result<String, SyncError> {
        let aad = OAuthCredential::doc_id(credential.provider, &credential.athlete_id);
        self.kms.decrypt(ciphertext, aad.as_bytes()).await
    }
}
