// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background task queue.
//!
//! This service creates tasks for:
//! - Building score reports off the interactive path
//! - Reminding users when their next program day becomes available
//!
//! In production tasks go through Cloud Tasks (official google-cloud-tasks-v2
//! SDK) and call back into `/tasks/*`. For local runs and tests they are
//! handed to a tokio worker in this process instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::Result;

/// Payload sent to the report building task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReportPayload {
    pub job_id: String,
    pub user_id: u64,
}

/// Payload for the program-day reminder.
///
/// The reminder is stale (and dropped) if the user has advanced or left the
/// program since it was scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramReminderPayload {
    pub user_id: u64,
    pub program_id: u32,
    /// Row counter right after the advance that scheduled this reminder
    pub days_completed_in_row: u32,
}

/// A task handed to the in-process worker.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedTask {
    BuildReport(BuildReportPayload),
    ProgramReminder {
        payload: ProgramReminderPayload,
        at: DateTime<Utc>,
    },
}

enum Backend {
    Cloud {
        project_id: String,
        location: String,
        queue_name: String,
    },
    InProcess(mpsc::UnboundedSender<QueuedTask>),
}

/// Task queue client.
pub struct TasksService {
    backend: Backend,
}

impl TasksService {
    /// Cloud Tasks backed queue.
    pub fn new(project_id: &str, region: &str) -> Self {
        Self {
            backend: Backend::Cloud {
                project_id: project_id.to_string(),
                location: region.to_string(),
                queue_name: crate::config::JOB_QUEUE_NAME.to_string(),
            },
        }
    }

    /// In-process queue; the receiver feeds the worker.
    pub fn in_process() -> (Self, mpsc::UnboundedReceiver<QueuedTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                backend: Backend::InProcess(tx),
            },
            rx,
        )
    }

    /// Queue a report build.
    pub async fn queue_build_report(
        &self,
        service_url: &str,
        payload: BuildReportPayload,
    ) -> Result<()> {
        tracing::info!(
            user_id = payload.user_id,
            job_id = %payload.job_id,
            "Queuing report build"
        );
        match &self.backend {
            Backend::InProcess(tx) => send(tx, QueuedTask::BuildReport(payload)),
            Backend::Cloud { .. } => {
                self.queue_task(service_url, "/tasks/build-report", &payload, None)
                    .await
            }
        }
    }

    /// Queue a reminder that fires at `at`.
    pub async fn queue_program_reminder(
        &self,
        service_url: &str,
        payload: ProgramReminderPayload,
        at: DateTime<Utc>,
    ) -> Result<()> {
        tracing::debug!(
            user_id = payload.user_id,
            program_id = payload.program_id,
            at = %crate::time_utils::format_utc_rfc3339(at),
            "Queuing program reminder"
        );
        match &self.backend {
            Backend::InProcess(tx) => send(tx, QueuedTask::ProgramReminder { payload, at }),
            Backend::Cloud { .. } => {
                self.queue_task(service_url, "/tasks/program-reminder", &payload, Some(at))
                    .await
            }
        }
    }

    /// Generic Cloud Tasks helper.
    async fn queue_task<T: Serialize>(
        &self,
        service_url: &str,
        endpoint: &str,
        payload: &T,
        schedule_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let Backend::Cloud {
            project_id,
            location,
            queue_name,
        } = &self.backend
        else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Cloud Tasks used without a cloud backend"
            )));
        };

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let queue_path = format!(
            "projects/{}/locations/{}/queues/{}",
            project_id, location, queue_name
        );

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", service_url, endpoint))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(crate::config::tasks_service_account(project_id))
                    .set_audience(service_url.to_string()),
            );

        let mut task = Task::default().set_http_request(http_request);
        if let Some(at) = schedule_at {
            task = task.set_schedule_time(google_cloud_wkt::Timestamp::clamp(at.timestamp(), 0));
        }

        let _response = client
            .create_task()
            .set_parent(queue_path)
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }
}

fn send(tx: &mpsc::UnboundedSender<QueuedTask>, task: QueuedTask) -> Result<()> {
    tx.send(task)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("In-process task worker has stopped")))
}
