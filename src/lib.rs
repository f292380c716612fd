// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity-Sync: pull fitness activities from Strava and Garmin into one
//! deduplicated store.
//!
//! This crate provides the backend service: provider clients, normalization
//! into a canonical activity record, cross-provider duplicate
//! reconciliation, a background sync job engine and webhook ingestion.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SyncStore;
use models::DisciplineLookup;
use services::{
    ActivityIngestor, EngineSettings, GoogleOidcVerifier, KmsService, Notifier, ProviderRegistry,
    SyncEngine, TokenManager, WebhookIngestor,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SyncStore>,
    pub providers: ProviderRegistry,
    pub tokens: TokenManager,
    pub ingestor: ActivityIngestor,
    pub engine: SyncEngine,
    pub webhooks: WebhookIngestor,
    pub oidc_verifier: Arc<GoogleOidcVerifier>,
}

impl AppState {
    /// Wire the service graph on top of a datastore and provider clients.
    pub fn new(
        config: Config,
        store: Arc<dyn SyncStore>,
        providers: ProviderRegistry,
        kms: KmsService,
        notifier: Arc<dyn Notifier>,
        oidc_verifier: Arc<GoogleOidcVerifier>,
    ) -> Self {
        let tokens = TokenManager::new(store.clone(), kms, providers.clone());
        let ingestor = ActivityIngestor::new(
            store.clone(),
            DisciplineLookup::new(config.default_discipline),
        );
        let engine = SyncEngine::new(
            store.clone(),
            providers.clone(),
            tokens.clone(),
            ingestor.clone(),
            EngineSettings::from_config(&config),
        );
        let webhooks = WebhookIngestor::new(
            store.clone(),
            providers.clone(),
            tokens.clone(),
            ingestor.clone(),
            notifier,
        );

        Self {
            config,
            store,
            providers,
            tokens,
            ingestor,
            engine,
            webhooks,
            oidc_verifier,
        }
    }
}
