// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background jobs: report building and program-day reminders.
//!
//! Both run outside the chat turn. Failures are recorded and logged, never
//! reported back to the command that queued them.

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::models::{
    JobStatus, Notification, NotificationKind, ReportJob, ReportPeriod, ScoreReport,
};
use crate::services::program::Advance;
use crate::services::score::{self, TrainingRecord};
use crate::services::tasks::{BuildReportPayload, ProgramReminderPayload, QueuedTask};
use crate::time_utils::local_date;
use crate::AppState;

/// Limit for concurrent set queries while loading a report's history.
const MAX_CONCURRENT_DB_OPS: usize = 10;

/// Create a pending report job and queue its build.
pub async fn submit_report(
    state: &AppState,
    user_id: u64,
    period: ReportPeriod,
    now: DateTime<Utc>,
) -> Result<ReportJob> {
    let job = ReportJob::pending(user_id, period, now);
    state.db.put_report_job(&job).await?;

    state
        .tasks_service
        .queue_build_report(
            &state.config.service_url,
            BuildReportPayload {
                job_id: job.job_id.clone(),
                user_id,
            },
        )
        .await?;

    Ok(job)
}

/// Run the score engine for a queued job, store the outcome and notify
/// the user.
///
/// Returns `Ok` whenever the outcome (success or failure) was recorded, so
/// the queue does not retry a build that failed for a non-transient reason.
/// A redelivered job is only built once, but its notification is sent until
/// one push succeeds.
pub async fn build_report(state: &AppState, payload: &BuildReportPayload) -> Result<JobStatus> {
    let mut job = state
        .db
        .get_report_job(&payload.job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("report job {}", payload.job_id)))?;

    if job.user_id != payload.user_id {
        return Err(AppError::BadRequest("report job belongs to another user".to_string()));
    }
    if job.notified {
        tracing::debug!(job_id = %job.job_id, "Report job already finished (idempotent skip)");
        return Ok(job.status);
    }

    let now = Utc::now();
    if job.status == JobStatus::Pending {
        match compute_report(state, job.user_id, job.period, now).await {
            Ok(report) => {
                tracing::info!(
                    user_id = job.user_id,
                    job_id = %job.job_id,
                    trainings = report.summary.total_trainings,
                    "Report built"
                );
                job.status = JobStatus::Completed;
                job.report = Some(report);
            }
            Err(e) => {
                tracing::error!(
                    user_id = job.user_id,
                    job_id = %job.job_id,
                    error = %e,
                    "Report build failed"
                );
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
            }
        }
        job.completed_at = Some(now);
        state.db.put_report_job(&job).await?;
    }

    let silent = state
        .db
        .get_user(job.user_id)
        .await?
        .map(|u| u.session.silent)
        .unwrap_or(false);
    state
        .db
        .push_notification(&Notification::new(
            job.user_id,
            NotificationKind::ReportReady {
                job_id: job.job_id.clone(),
            },
            silent,
            now,
        ))
        .await?;

    job.notified = true;
    state.db.put_report_job(&job).await?;

    Ok(job.status)
}

/// Fetch the user's history for `period` and aggregate it.
pub async fn compute_report(
    state: &AppState,
    user_id: u64,
    period: ReportPeriod,
    now: DateTime<Utc>,
) -> Result<ScoreReport> {
    let body_weight = state
        .db
        .get_user(user_id)
        .await?
        .and_then(|u| u.body_weight_kg)
        .unwrap_or(state.config.default_body_weight_kg);

    let trainings = state.db.closed_trainings(user_id, period.since(now)).await?;
    let history: Vec<TrainingRecord> = stream::iter(trainings)
        .map(|training| async move {
            let sets = state.db.sets_for_training(&training.id).await?;
            Ok::<_, AppError>(TrainingRecord { training, sets })
        })
        .buffered(MAX_CONCURRENT_DB_OPS)
        .try_collect()
        .await?;

    Ok(score::aggregate(
        period,
        now,
        &history,
        &state.catalog,
        body_weight,
    ))
}

/// Queue the reminder for the day after a successful advance.
pub async fn schedule_program_reminder(
    state: &AppState,
    user_id: u64,
    program_id: u32,
    advance: &Advance,
) -> Result<()> {
    let Some(at) = advance.available_at else {
        return Ok(());
    };
    state
        .tasks_service
        .queue_program_reminder(
            &state.config.service_url,
            ProgramReminderPayload {
                user_id,
                program_id,
                days_completed_in_row: advance.days_completed_in_row,
            },
            at,
        )
        .await
}

/// Deliver a program reminder unless it went stale. Returns whether a
/// notification was sent.
pub async fn program_reminder(
    state: &AppState,
    payload: &ProgramReminderPayload,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(user) = state.db.get_user(payload.user_id).await? else {
        return Ok(false);
    };

    let still_due = user.active_program_id == Some(payload.program_id)
        && user.session.days_completed_in_row == payload.days_completed_in_row;
    if !still_due {
        tracing::debug!(
            user_id = payload.user_id,
            program_id = payload.program_id,
            "Stale program reminder dropped"
        );
        return Ok(false);
    }

    state
        .db
        .push_notification(&Notification::new(
            user.user_id,
            NotificationKind::ProgramDayAvailable {
                program_id: payload.program_id,
                date: local_date(now, state.config.utc_offset_minutes),
            },
            user.session.silent,
            now,
        ))
        .await?;

    tracing::info!(
        user_id = payload.user_id,
        program_id = payload.program_id,
        "Program day reminder sent"
    );
    Ok(true)
}

/// Drain the in-process queue until every sender is gone.
///
/// Each task runs on its own tokio task so a sleeping reminder never holds
/// up a report.
pub async fn run_worker(state: Arc<AppState>, mut rx: mpsc::UnboundedReceiver<QueuedTask>) {
    tracing::info!("In-process task worker started");
    while let Some(task) = rx.recv().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match task {
                QueuedTask::BuildReport(payload) => {
                    if let Err(e) = build_report(&state, &payload).await {
                        tracing::error!(job_id = %payload.job_id, error = %e, "Report task failed");
                    }
                }
                QueuedTask::ProgramReminder { payload, at } => {
                    if let Ok(delay) = (at - Utc::now()).to_std() {
                        tokio::time::sleep(delay).await;
                    }
                    if let Err(e) = program_reminder(&state, &payload, Utc::now()).await {
                        tracing::error!(
                            user_id = payload.user_id,
                            error = %e,
                            "Reminder task failed"
                        );
                    }
                }
            }
        });
    }
    tracing::info!("In-process task worker stopped");
}
