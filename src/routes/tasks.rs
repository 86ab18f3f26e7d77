// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks, not directly by users. The
//! queue header and OIDC token checks live in `middleware::tasks_auth`.

use crate::error::AppError;
use crate::services::jobs;
use crate::services::tasks::{BuildReportPayload, ProgramReminderPayload};
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/build-report", post(build_report))
        .route("/tasks/program-reminder", post(program_reminder))
}

/// Build a queued score report.
async fn build_report(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BuildReportPayload>,
) -> StatusCode {
    tracing::info!(
        user_id = payload.user_id,
        job_id = %payload.job_id,
        "Building report from Cloud Task"
    );

    match jobs::build_report(&state, &payload).await {
        Ok(status) => {
            tracing::debug!(job_id = %payload.job_id, status = ?status, "Report task done");
            StatusCode::OK
        }
        // Job vanished or is not the caller's: retrying cannot help
        Err(e @ (AppError::NotFound(_) | AppError::BadRequest(_))) => {
            tracing::warn!(job_id = %payload.job_id, error = %e, "Dropping report task");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(job_id = %payload.job_id, error = %e, "Report task failed");
            // Return 500 to trigger Cloud Tasks retry
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Tell the user their next program day is available.
async fn program_reminder(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProgramReminderPayload>,
) -> StatusCode {
    match jobs::program_reminder(&state, &payload, chrono::Utc::now()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::error!(
                user_id = payload.user_id,
                program_id = payload.program_id,
                error = %e,
                "Program reminder failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
