// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.
//!
//! The chat front-end decodes each user action into one [`Command`] and
//! posts it to `/api/commands`; everything after that is typed.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    ActivityLevel, CalculatorDraft, DayPlan, Gender, NextDay, Notification, Program, ReportJob,
    ReportPeriod, RestAdvisory, TrainingHistory, TrainingSummary, User,
};
use crate::services::calculator::{self, CalculatorResult, Measurements};
use crate::services::jobs;
use crate::services::session::{ExerciseStarted, RepRecorded};
use crate::services::RepInput;
use crate::time_utils::from_epoch_secs;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/commands", post(post_command))
        .route("/api/me", get(get_me))
        .route("/api/programs", get(get_programs))
        .route("/api/trainings", get(get_trainings))
        .route("/api/reports/{job_id}", get(get_report))
        .route("/api/notifications", get(get_notifications))
}

// ─── Commands ────────────────────────────────────────────────

/// A command plus the time the user sent it.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(flatten)]
    pub command: Command,
    /// Event time in epoch seconds; defaults to the time of receipt
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Every action the front-end can ask for.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartExercise {
        exercise_id: String,
    },
    RecordRep {
        #[serde(default)]
        exercise_id: Option<String>,
        input: RepInputBody,
    },
    EditLastRep {
        #[serde(default)]
        exercise_id: Option<String>,
        input: RepInputBody,
    },
    EndTraining,
    StartProgram {
        program_id: u32,
    },
    NextProgramDay {
        program_id: u32,
    },
    StopProgram,
    RequestReport {
        period: ReportPeriod,
    },
    UpdateSettings(SettingsUpdate),
    /// First calculator step; the measurements come in a later command
    CalculatorProfile {
        gender: Gender,
        activity_level: ActivityLevel,
    },
    Calculate {
        input: MeasurementsBody,
    },
}

/// Rep input as typed by the user (`"10 52,5"`) or already split up.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RepInputBody {
    Text(String),
    Fields { reps: u32, weight: Option<f64> },
}

impl RepInputBody {
    fn into_input(self) -> Result<RepInput> {
        match self {
            RepInputBody::Text(raw) => RepInput::parse(&raw),
            RepInputBody::Fields { reps, weight } => RepInput::new(reps, weight),
        }
    }
}

/// Calculator measurements as typed (`"20 185 75"`) or already split up.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MeasurementsBody {
    Text(String),
    Fields(Measurements),
}

impl MeasurementsBody {
    fn into_measurements(self) -> Result<Measurements> {
        match self {
            MeasurementsBody::Text(raw) => Measurements::parse(&raw),
            MeasurementsBody::Fields(m) => {
                m.validate()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                Ok(m)
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SettingsUpdate {
    #[validate(range(min = 20.0, max = 400.0, message = "Body weight must be 20-400 kg"))]
    pub body_weight_kg: Option<f64>,
    #[validate(length(min = 2, max = 16, message = "Locale must be 2-16 characters"))]
    pub locale: Option<String>,
    /// Deliver notifications without sound
    pub silent: Option<bool>,
}

/// Result of a command.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    ExerciseStarted(ExerciseStarted),
    RepRecorded(RepRecorded),
    TrainingEnded(TrainingSummary),
    ProgramStarted {
        program_id: u32,
    },
    DayPlan {
        plan: DayPlan,
        days_completed_in_row: u32,
    },
    RestAdvisory(RestAdvisory),
    ProgramStopped {
        program_id: Option<u32>,
    },
    ReportQueued {
        job_id: String,
        period: ReportPeriod,
    },
    SettingsUpdated(User),
    CalculatorProfileSaved(CalculatorDraft),
    Calculation(CalculatorResult),
}

async fn post_command(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<Outcome>> {
    let at = request.timestamp.map(from_epoch_secs).unwrap_or_else(Utc::now);
    let outcome = execute(&state, user.user_id, request.command, at).await?;
    Ok(Json(outcome))
}

/// Run one command for `user_id` at event time `at`.
pub async fn execute(
    state: &AppState,
    user_id: u64,
    command: Command,
    at: DateTime<Utc>,
) -> Result<Outcome> {
    match command {
        Command::StartExercise { exercise_id } => state
            .sessions()
            .start_exercise(user_id, &exercise_id, at)
            .await
            .map(Outcome::ExerciseStarted),

        Command::RecordRep { exercise_id, input } => {
            let input = input.into_input()?;
            state
                .sessions()
                .record_rep(user_id, exercise_id.as_deref(), input, at)
                .await
                .map(Outcome::RepRecorded)
        }

        Command::EditLastRep { exercise_id, input } => {
            let input = input.into_input()?;
            state
                .sessions()
                .edit_last_rep(user_id, exercise_id.as_deref(), input, at)
                .await
                .map(Outcome::RepRecorded)
        }

        Command::EndTraining => state
            .sessions()
            .end_training(user_id, at)
            .await
            .map(Outcome::TrainingEnded),

        Command::StartProgram { program_id } => {
            state.scheduler().start_program(user_id, program_id, at).await?;
            Ok(Outcome::ProgramStarted { program_id })
        }

        Command::NextProgramDay { program_id } => {
            let advance = state.scheduler().next_day(user_id, program_id, at).await?;
            if matches!(advance.next, NextDay::Advanced(_)) {
                // The day was already handed out; a missing reminder is not
                // worth failing the command over.
                if let Err(e) =
                    jobs::schedule_program_reminder(state, user_id, program_id, &advance).await
                {
                    tracing::warn!(user_id, program_id, error = %e, "Failed to queue reminder");
                }
            }
            Ok(match advance.next {
                NextDay::Advanced(plan) => Outcome::DayPlan {
                    plan,
                    days_completed_in_row: advance.days_completed_in_row,
                },
                NextDay::Rest(advisory) => Outcome::RestAdvisory(advisory),
            })
        }

        Command::StopProgram => {
            let program_id = state.scheduler().stop_program(user_id, at).await?;
            Ok(Outcome::ProgramStopped { program_id })
        }

        Command::RequestReport { period } => {
            let job = jobs::submit_report(state, user_id, period, at).await?;
            Ok(Outcome::ReportQueued {
                job_id: job.job_id,
                period,
            })
        }

        Command::UpdateSettings(update) => {
            update
                .validate()
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let user = state
                .db
                .with_session(user_id, at, |snapshot| {
                    let user = &mut snapshot.user;
                    if let Some(weight) = update.body_weight_kg {
                        user.body_weight_kg = Some(weight);
                    }
                    if let Some(locale) = &update.locale {
                        user.locale = locale.clone();
                    }
                    if let Some(silent) = update.silent {
                        user.session.silent = silent;
                    }
                    user.last_active = at;
                    Ok(user.clone())
                })
                .await?;
            tracing::info!(user_id, "Settings updated");
            Ok(Outcome::SettingsUpdated(user))
        }

        Command::CalculatorProfile {
            gender,
            activity_level,
        } => {
            let draft = CalculatorDraft {
                gender,
                activity_level,
            };
            state
                .db
                .with_session(user_id, at, |snapshot| {
                    snapshot.user.session.calculator_draft = Some(draft);
                    snapshot.user.last_active = at;
                    Ok(())
                })
                .await?;
            Ok(Outcome::CalculatorProfileSaved(draft))
        }

        Command::Calculate { input } => {
            let measurements = input.into_measurements()?;
            let result = state
                .db
                .with_session(user_id, at, |snapshot| {
                    let draft = snapshot.user.session.calculator_draft.take().ok_or_else(|| {
                        AppError::BadRequest(
                            "choose gender and activity level before measurements".to_string(),
                        )
                    })?;
                    snapshot.user.last_active = at;
                    Ok(calculator::calculate(draft, &measurements))
                })
                .await?;
            tracing::debug!(user_id, bmi = result.bmi, "Calculator result");
            Ok(Outcome::Calculation(result))
        }
    }
}

// ─── Queries ─────────────────────────────────────────────────

/// Get the current user, including session state.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>> {
    let record = state
        .db
        .get_user(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ProgramsQuery {
    group: Option<String>,
    level: Option<String>,
}

/// Programs, optionally narrowed to a group and/or level.
async fn get_programs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgramsQuery>,
) -> Result<Json<Vec<Program>>> {
    let programs = match (&query.group, &query.level) {
        (Some(group), Some(level)) => {
            let program = state.catalog.program_for(group, level).ok_or_else(|| {
                AppError::NotFound(format!("no program for {} / {}", group, level))
            })?;
            vec![program.clone()]
        }
        (group, level) => state
            .catalog
            .programs()
            .iter()
            .filter(|p| group.as_ref().map_or(true, |g| &p.group_id == g))
            .filter(|p| level.as_ref().map_or(true, |l| &p.level_id == l))
            .cloned()
            .collect(),
    };
    Ok(Json(programs))
}

#[derive(Debug, Deserialize)]
struct TrainingsQuery {
    /// Number of trainings; the configured default when absent
    limit: Option<usize>,
}

const MAX_HISTORY: usize = 50;

/// The caller's most recent closed trainings.
async fn get_trainings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<TrainingsQuery>,
) -> Result<Json<Vec<TrainingHistory>>> {
    let limit = params.limit.unwrap_or(state.config.last_trainings_num);
    if limit == 0 || limit > MAX_HISTORY {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY
        )));
    }
    let history = state.sessions().history(user.user_id, limit).await?;
    tracing::debug!(user_id = user.user_id, trainings = history.len(), "Fetched history");
    Ok(Json(history))
}

/// A report job of the caller.
async fn get_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> Result<Json<ReportJob>> {
    let job = state
        .db
        .get_report_job(&job_id)
        .await?
        .filter(|job| job.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound(format!("report job {}", job_id)))?;
    Ok(Json(job))
}

/// Pending notifications of the caller; reading removes them.
async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(state.db.drain_notifications(user.user_id).await?))
}
