// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No training in progress")]
    NoActiveTraining,

    #[error("Another program is already active: {active_program_id}")]
    ConflictActiveProgram { active_program_id: u32 },

    #[error("Invalid rep input: {0}")]
    InvalidRepInput(String),

    #[error("Set has no recorded reps")]
    EmptySet,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for validation-class errors that the user can fix within the
    /// same turn. Everything else aborts the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::NoActiveTraining
                | AppError::ConflictActiveProgram { .. }
                | AppError::InvalidRepInput(_)
                | AppError::EmptySet
                | AppError::NotFound(_)
                | AppError::BadRequest(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_recoverable() {
            tracing::debug!(error = %self, "Rejected command");
        }

        let (status, error, details) = match &self {
            AppError::NoActiveTraining => (StatusCode::CONFLICT, "no_active_training", None),
            AppError::ConflictActiveProgram { active_program_id } => (
                StatusCode::CONFLICT,
                "conflict_active_program",
                Some(format!("active program {}", active_program_id)),
            ),
            AppError::InvalidRepInput(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_rep_input",
                Some(msg.clone()),
            ),
            AppError::EmptySet => (StatusCode::CONFLICT, "empty_set", None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
