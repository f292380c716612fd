// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity-Sync API Server
//!
//! Pulls activities from Strava and Garmin, reconciles duplicates across
//! providers, and runs scheduled background sync jobs.

use activity_sync::{
    config::{Config, DatastoreKind},
    db::{FirestoreDb, MemoryStore, SyncStore},
    services::{
        provider::http_client, GarminClient, GoogleOidcVerifier, KmsService, LogNotifier,
        Notifier, ProviderRegistry, StravaClient, TasksNotifier,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Activity-Sync API");

    let store: Arc<dyn SyncStore> = match config.datastore {
        DatastoreKind::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        DatastoreKind::Memory => {
            tracing::warn!("Using in-memory datastore, nothing will be persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let google_oidc_verifier =
        Arc::new(GoogleOidcVerifier::new(&config).expect("Failed to initialize OIDC verifier"));

    // Initialize KMS service
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        "token-encryption",
    )
    .await
    .expect("Failed to initialize KMS service");
    tracing::info!("KMS service initialized");

    let http = http_client().expect("Failed to build HTTP client");
    let providers = ProviderRegistry::new()
        .with(Arc::new(StravaClient::new(
            http.clone(),
            config.strava_api_url.clone(),
            config.strava_token_url.clone(),
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        )))
        .with(Arc::new(GarminClient::new(
            http,
            config.garmin_api_url.clone(),
            config.garmin_token_url.clone(),
            config.garmin_client_id.clone(),
            config.garmin_client_secret.clone(),
        )));

    let notifier: Arc<dyn Notifier> = match &config.notify_url {
        Some(url) => {
            tracing::info!(
                project = %config.gcp_project_id,
                notify_url = %url,
                "Cloud Tasks notifications enabled"
            );
            Arc::new(TasksNotifier::new(
                &config.gcp_project_id,
                &config.gcp_region,
                url,
                &config.internal_service_account(),
            ))
        }
        None => Arc::new(LogNotifier),
    };

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        providers,
        kms,
        notifier,
        google_oidc_verifier,
    ));

    // Build router
    let app = activity_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("activity_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
