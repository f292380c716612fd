// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity notifications.
//!
//! After a webhook stores a new activity, the athlete's notification
//! endpoint is told about it. In production this goes through a Cloud Task
//! (using the official google-cloud-tasks-v2 SDK) so delivery is retried
//! off the webhook's hot path. Without a notification URL, notifications
//! are only logged.

use crate::error::AppError;
use crate::error::Result;
use crate::models::Activity;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Cloud Tasks queue used for notification delivery.
pub const NOTIFY_QUEUE_NAME: &str = "activity-notifications";

/// Payload POSTed to the notification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySyncedPayload {
    pub athlete_id: String,
    pub activity_id: String,
    pub source: String,
    pub discipline: String,
    pub name: String,
    pub start_time: String,
}

impl ActivitySyncedPayload {
    pub fn new(athlete_id: &str, activity: &Activity) -> Self {
        Self {
            athlete_id: athlete_id.to_string(),
            activity_id: activity.id.clone(),
            source: activity.source.to_string(),
            discipline: activity.discipline.code().to_string(),
            name: activity.name.clone(),
            start_time: format_utc_rfc3339(activity.start_time),
        }
    }
}

/// Receives "new activity stored" events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn activity_synced(&self, athlete_id: &str, activity: &Activity) -> Result<()>;
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn activity_synced(&self, athlete_id: &str, activity: &Activity) -> Result<()> {
        tracing::info!(
            athlete_id,
            activity_id = %activity.id,
            source = %activity.source,
            "Activity synced (notification delivery disabled)"
        );
        Ok(())
    }
}

/// Cloud Tasks client wrapper.
pub struct TasksNotifier {
    project_id: String,
    location: String,
    queue_name: String,
    notify_url: String,
    service_account: String,
}

impl TasksNotifier {
    pub fn new(project_id: &str, region: &str, notify_url: &str, service_account: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: NOTIFY_QUEUE_NAME.to_string(),
            notify_url: notify_url.to_string(),
            service_account: service_account.to_string(),
        }
    }

    /// Generic task queuing helper.
    async fn queue_task<T: Serialize>(&self, payload: &T) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let queue_path = format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        );

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(self.notify_url.clone())
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(self.service_account.clone())
                    .set_audience(self.notify_url.clone()),
            );

        let task = Task::default().set_http_request(http_request);

        client
            .create_task()
            .set_parent(queue_path)
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for TasksNotifier {
    async fn activity_synced(&self, athlete_id: &str, activity: &Activity) -> Result<()> {
        let payload = ActivitySyncedPayload::new(athlete_id, activity);
        self.queue_task(&payload).await?;
        tracing::info!(
            athlete_id,
            activity_id = %activity.id,
            "Queued activity notification"
        );
        Ok(())
    }
}
