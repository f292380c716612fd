// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod credentials;
pub mod garmin;
pub mod google_oidc;
pub mod ingest;
pub mod kms;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod strava;
pub mod sync_engine;
pub mod tasks;
pub mod webhook;

pub use credentials::TokenManager;
pub use garmin::GarminClient;
pub use google_oidc::{GoogleOidcVerifier, OidcError, VerifiedServicePrincipal};
pub use ingest::{ActivityIngestor, IngestAction, IngestOutcome};
pub use kms::KmsService;
pub use provider::{ActivityProvider, FetchWindow, Paging, ProviderRegistry};
pub use strava::StravaClient;
pub use sync_engine::{EngineSettings, SyncEngine, SweepReport, TickReport};
pub use tasks::{LogNotifier, Notifier, TasksNotifier};
pub use webhook::{EventOutcome, StravaEvent, WebhookIngestor};
