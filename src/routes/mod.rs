// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod jobs;
pub mod tasks;
pub mod webhook;

use crate::middleware::{require_scheduler_auth, require_service_auth};
use crate::AppState;
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_id: String,
}

/// Liveness check for Cloud Run. Never touches the datastore.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_id: option_env!("BUILD_ID").unwrap_or("unknown").to_string(),
    })
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes (providers call these directly)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .merge(webhook::routes());

    // Scheduler routes
    let scheduler_routes = tasks::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_scheduler_auth,
    ));

    // Internal service routes
    let service_routes = jobs::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_service_auth,
    ));

    Router::new()
        .merge(public_routes)
        .merge(scheduler_routes)
        .merge(service_routes)
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
