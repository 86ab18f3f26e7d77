// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session controller: the training/set state machine.
//!
//! Every operation runs as one session transaction:
//! 1. Load the user, their open training and its sets
//! 2. Apply one of the pure transitions below
//! 3. Commit everything, or nothing if the transition failed
//!
//! Training and set share the shape `NotStarted -> Open -> Closed`; a set
//! still empty when its training closes is discarded instead.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::db::{SessionSnapshot, Store};
use crate::error::{AppError, Result};
use crate::models::{
    HistorySet, RepEntry, Training, TrainingHistory, TrainingSummary, WorkoutSet,
};
use crate::services::CatalogService;
use crate::time_utils::{from_epoch_secs, to_epoch_secs};

/// Whole rep input: a count and an optional weight, `.` or `,` as decimal separator.
static REP_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:[.,]\d+)?)(?:\s+(\d+(?:[.,]\d+)?))?$")
        .expect("rep input pattern is valid")
});

/// Above this the score formula's denominator approaches zero.
const MAX_REPS: u32 = 300;
const MAX_WEIGHT_KG: f64 = 1000.0;

/// Reps and optional weight typed by the user, e.g. `"10 52,5"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepInput {
    pub reps: u32,
    pub weight: Option<f64>,
}

impl RepInput {
    /// The first number is the rep count, the second (if any) the weight.
    /// Anything else in the message is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let captures = REP_INPUT.captures(trimmed).ok_or_else(|| {
            AppError::InvalidRepInput(format!("expected \"<reps> [weight]\", got {:?}", trimmed))
        })?;

        let reps_raw = &captures[1];
        let reps: u32 = reps_raw.parse().map_err(|_| {
            AppError::InvalidRepInput(format!("rep count must be a whole number: {}", reps_raw))
        })?;

        let weight = captures
            .get(2)
            .map(|m| {
                let w = m.as_str().replace(',', ".");
                w.parse::<f64>()
                    .map_err(|_| AppError::InvalidRepInput(format!("invalid weight: {}", w)))
            })
            .transpose()?;

        Self::new(reps, weight)
    }

    pub fn new(reps: u32, weight: Option<f64>) -> Result<Self> {
        if reps == 0 || reps > MAX_REPS {
            return Err(AppError::InvalidRepInput(format!(
                "rep count must be between 1 and {}",
                MAX_REPS
            )));
        }
        if let Some(weight) = weight {
            if !weight.is_finite() || !(0.0..=MAX_WEIGHT_KG).contains(&weight) {
                return Err(AppError::InvalidRepInput(format!(
                    "weight must be between 0 and {} kg",
                    MAX_WEIGHT_KG
                )));
            }
        }
        Ok(Self { reps, weight })
    }

    /// Entry for an exercise; a weight is mandatory when the exercise needs one.
    fn to_entry(self, needs_weight: bool, timestamp: f64) -> Result<RepEntry> {
        let weight = match (self.weight, needs_weight) {
            (Some(weight), _) => weight,
            (None, false) => 0.0,
            (None, true) => {
                return Err(AppError::InvalidRepInput(
                    "this exercise needs a weight".to_string(),
                ))
            }
        };
        Ok(RepEntry {
            reps: self.reps,
            weight,
            timestamp,
        })
    }
}

/// Result of starting (or returning to) an exercise.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseStarted {
    pub training_id: String,
    pub set: WorkoutSet,
    /// Entries of the last closed set of this exercise, for "previous reps"
    pub previous: Option<WorkoutSet>,
    /// Next exercise due in today's program day
    pub next_in_program: Option<String>,
    /// The last exercise of today's program day has been started
    pub program_day_complete: bool,
}

/// Result of recording or correcting a rep entry.
#[derive(Debug, Clone, Serialize)]
pub struct RepRecorded {
    pub set_id: String,
    pub exercise_id: String,
    pub entry: RepEntry,
    pub entry_count: usize,
}

// ─── Transitions ─────────────────────────────────────────────────

/// The open training, created if needed. Returns whether it was created.
pub fn open_training(snapshot: &mut SessionSnapshot, now: DateTime<Utc>) -> (Training, bool) {
    if let Some(training) = snapshot.training.as_ref().filter(|t| t.is_open()) {
        return (training.clone(), false);
    }

    let training = Training {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: snapshot.user.user_id,
        created: now,
        end: None,
    };
    snapshot.user.session.open_training_id = Some(training.id.clone());
    snapshot.training = Some(training.clone());
    snapshot.sets.clear();
    (training, true)
}

/// Index of the open set for `exercise_id` in the open training, created if
/// needed. Returns whether it was created.
pub fn open_set(
    snapshot: &mut SessionSnapshot,
    training_id: &str,
    exercise_id: &str,
    now: DateTime<Utc>,
) -> Result<(usize, bool)> {
    match &snapshot.training {
        Some(training) if training.is_open() && training.id == training_id => {}
        _ => return Err(AppError::NoActiveTraining),
    }

    if let Some(idx) = snapshot
        .sets
        .iter()
        .position(|s| s.is_open() && s.exercise_id == exercise_id)
    {
        return Ok((idx, false));
    }

    snapshot.sets.push(WorkoutSet {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: snapshot.user.user_id,
        training_id: training_id.to_string(),
        exercise_id: exercise_id.to_string(),
        entries: Vec::new(),
        created: now,
        end: None,
    });
    Ok((snapshot.sets.len() - 1, true))
}

/// Open training id, or `NoActiveTraining`.
fn require_open_training(snapshot: &SessionSnapshot) -> Result<String> {
    snapshot
        .training
        .as_ref()
        .filter(|t| t.is_open())
        .map(|t| t.id.clone())
        .ok_or(AppError::NoActiveTraining)
}

/// Drop the exercise from today's program queue.
/// Returns the next due exercise and whether the day is complete.
pub fn advance_program_queue(
    snapshot: &mut SessionSnapshot,
    exercise_id: &str,
) -> (Option<String>, bool) {
    match snapshot.user.session.program_queue.as_mut() {
        Some(queue) => {
            if let Some(pos) = queue.iter().rposition(|e| e == exercise_id) {
                queue.remove(pos);
            }
            (queue.last().cloned(), queue.is_empty())
        }
        None => (None, false),
    }
}

/// Close the open training.
///
/// Sets with entries end at their last entry; empty sets are discarded.
/// The program queue is cleared.
pub fn close_training(
    snapshot: &mut SessionSnapshot,
    catalog: &CatalogService,
    now: DateTime<Utc>,
) -> Result<TrainingSummary> {
    let training_id = require_open_training(snapshot)?;

    snapshot.sets.retain(|s| !s.entries.is_empty());
    for set in snapshot.sets.iter_mut().filter(|s| s.is_open()) {
        // retain() above guarantees an entry
        if let Some(last) = set.entries.last() {
            set.end = Some(from_epoch_secs(last.timestamp));
        }
    }
    let last_set_end = snapshot.sets.iter().filter_map(|s| s.end).max();

    let training = snapshot
        .training
        .as_mut()
        .ok_or(AppError::NoActiveTraining)?;
    // A client clock behind the recorded events never ends the training
    // before they happened.
    let end = [Some(now), Some(training.created), last_set_end]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(now);
    training.end = Some(end);
    let training_duration_secs = training.duration_secs().unwrap_or(0.0);

    snapshot.user.session.open_training_id = None;
    snapshot.user.session.program_queue = None;

    let mut exercises: Vec<String> = Vec::new();
    for set in &snapshot.sets {
        let name = catalog
            .exercise(&set.exercise_id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| set.exercise_id.clone());
        if !exercises.contains(&name) {
            exercises.push(name);
        }
    }

    let set_count = snapshot.sets.len();
    let rests: Vec<f64> = snapshot
        .sets
        .iter()
        .flat_map(|s| s.rest_intervals())
        .collect();

    Ok(TrainingSummary {
        training_id,
        weight_lifted: snapshot.sets.iter().map(WorkoutSet::weight_lifted).sum(),
        exercises,
        training_duration_secs,
        mean_set_duration_secs: if set_count == 0 {
            0.0
        } else {
            snapshot
                .sets
                .iter()
                .map(WorkoutSet::duration_secs)
                .sum::<f64>()
                / set_count as f64
        },
        mean_rest_secs: if rests.is_empty() {
            0.0
        } else {
            rests.iter().sum::<f64>() / rests.len() as f64
        },
    })
}

// ─── Controller ──────────────────────────────────────────────────

/// Runs session transitions against the store.
pub struct SessionController<'a> {
    db: &'a dyn Store,
    catalog: &'a CatalogService,
}

impl<'a> SessionController<'a> {
    pub fn new(db: &'a dyn Store, catalog: &'a CatalogService) -> Self {
        Self { db, catalog }
    }

    /// The user's open training, created if there is none.
    pub async fn begin_or_resume_training(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Training> {
        let (training, created) = self
            .db
            .with_session(user_id, now, |snapshot| {
                snapshot.user.last_active = now;
                Ok(open_training(snapshot, now))
            })
            .await?;

        if created {
            tracing::info!(user_id, training_id = %training.id, "Training opened");
        } else {
            tracing::debug!(user_id, training_id = %training.id, "Training resumed");
        }
        Ok(training)
    }

    /// The open set for the exercise in the given (open) training, created
    /// if there is none.
    pub async fn begin_or_resume_set(
        &self,
        user_id: u64,
        exercise_id: &str,
        training_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkoutSet> {
        self.require_exercise(exercise_id)?;

        let (set, created) = self
            .db
            .with_session(user_id, now, |snapshot| {
                let (idx, created) = open_set(snapshot, training_id, exercise_id, now)?;
                snapshot.user.session.last_exercise_id = Some(exercise_id.to_string());
                snapshot.user.last_active = now;
                Ok((snapshot.sets[idx].clone(), created))
            })
            .await?;

        if created {
            tracing::info!(user_id, training_id, exercise_id, set_id = %set.id, "Set opened");
        }
        Ok(set)
    }

    /// Open the training and the set for an exercise in one go, consuming
    /// the exercise from today's program queue.
    pub async fn start_exercise(
        &self,
        user_id: u64,
        exercise_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ExerciseStarted> {
        self.require_exercise(exercise_id)?;

        let (training, set, next_in_program, program_day_complete) = self
            .db
            .with_session(user_id, now, |snapshot| {
                let (training, _) = open_training(snapshot, now);
                let (idx, _) = open_set(snapshot, &training.id, exercise_id, now)?;
                let (next, complete) = advance_program_queue(snapshot, exercise_id);
                snapshot.user.session.last_exercise_id = Some(exercise_id.to_string());
                snapshot.user.last_active = now;
                Ok((training, snapshot.sets[idx].clone(), next, complete))
            })
            .await?;

        let previous = self.db.last_closed_set(user_id, exercise_id).await?;

        tracing::info!(
            user_id,
            training_id = %training.id,
            exercise_id,
            set_id = %set.id,
            program_day_complete,
            "Exercise started"
        );

        Ok(ExerciseStarted {
            training_id: training.id,
            set,
            previous,
            next_in_program,
            program_day_complete,
        })
    }

    /// Append an entry to the open set of `exercise_id`, or of the last
    /// exercise worked on when none is given.
    pub async fn record_rep(
        &self,
        user_id: u64,
        exercise_id: Option<&str>,
        input: RepInput,
        timestamp: DateTime<Utc>,
    ) -> Result<RepRecorded> {
        let recorded = self
            .db
            .with_session(user_id, timestamp, |snapshot| {
                let (idx, needs_weight) = self.current_set(snapshot, exercise_id, timestamp)?;
                let entry = input.to_entry(needs_weight, to_epoch_secs(timestamp))?;
                let set = &mut snapshot.sets[idx];
                set.entries.push(entry);
                let recorded = RepRecorded {
                    set_id: set.id.clone(),
                    exercise_id: set.exercise_id.clone(),
                    entry,
                    entry_count: set.entries.len(),
                };
                snapshot.user.last_active = timestamp;
                Ok(recorded)
            })
            .await?;

        tracing::debug!(
            user_id,
            set_id = %recorded.set_id,
            reps = recorded.entry.reps,
            weight = recorded.entry.weight,
            "Rep recorded"
        );
        Ok(recorded)
    }

    /// Replace the most recent entry of the set.
    pub async fn edit_last_rep(
        &self,
        user_id: u64,
        exercise_id: Option<&str>,
        input: RepInput,
        timestamp: DateTime<Utc>,
    ) -> Result<RepRecorded> {
        let recorded = self
            .db
            .with_session(user_id, timestamp, |snapshot| {
                let (idx, needs_weight) = self.current_set(snapshot, exercise_id, timestamp)?;
                let entry = input.to_entry(needs_weight, to_epoch_secs(timestamp))?;
                let set = &mut snapshot.sets[idx];
                if set.entries.pop().is_none() {
                    return Err(AppError::EmptySet);
                }
                set.entries.push(entry);
                let recorded = RepRecorded {
                    set_id: set.id.clone(),
                    exercise_id: set.exercise_id.clone(),
                    entry,
                    entry_count: set.entries.len(),
                };
                snapshot.user.last_active = timestamp;
                Ok(recorded)
            })
            .await?;

        tracing::debug!(user_id, set_id = %recorded.set_id, "Last rep edited");
        Ok(recorded)
    }

    /// Close the open training and summarize it.
    pub async fn end_training(&self, user_id: u64, now: DateTime<Utc>) -> Result<TrainingSummary> {
        let (summary, discarded) = self
            .db
            .with_session(user_id, now, |snapshot| {
                let summary = close_training(snapshot, self.catalog, now)?;
                snapshot.user.last_active = now;
                Ok((summary, snapshot.removed_set_ids().len()))
            })
            .await?;

        tracing::info!(
            user_id,
            training_id = %summary.training_id,
            exercises = summary.exercises.len(),
            discarded_sets = discarded,
            weight_lifted = summary.weight_lifted,
            "Training closed"
        );
        Ok(summary)
    }

    /// The user's last `limit` closed trainings, newest first, with the
    /// exercises of every set.
    pub async fn history(&self, user_id: u64, limit: usize) -> Result<Vec<TrainingHistory>> {
        let trainings = self.db.recent_closed_trainings(user_id, limit).await?;
        let mut history = Vec::with_capacity(trainings.len());
        for training in trainings {
            let sets = self.db.sets_for_training(&training.id).await?;
            history.push(TrainingHistory {
                sets: sets.iter().map(|set| self.describe_set(set)).collect(),
                training_id: training.id,
                created: training.created,
                end: training.end,
            });
        }
        Ok(history)
    }

    fn describe_set(&self, set: &WorkoutSet) -> HistorySet {
        match self.catalog.exercise(&set.exercise_id) {
            Some(exercise) => HistorySet {
                exercise_id: set.exercise_id.clone(),
                group: self
                    .catalog
                    .group_name(&exercise.group_id)
                    .unwrap_or(&exercise.group_id)
                    .to_string(),
                tool: self
                    .catalog
                    .tool_name(&exercise.tool_id)
                    .unwrap_or(&exercise.tool_id)
                    .to_string(),
                exercise: exercise.name.clone(),
            },
            None => HistorySet {
                exercise_id: set.exercise_id.clone(),
                group: "other".to_string(),
                tool: "other".to_string(),
                exercise: set.exercise_id.clone(),
            },
        }
    }

    fn require_exercise(&self, exercise_id: &str) -> Result<()> {
        self.catalog
            .exercise(exercise_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("exercise {}", exercise_id)))
    }

    /// Set that a rep command applies to, resumed or opened inside the
    /// open training, plus whether its exercise needs a weight.
    fn current_set(
        &self,
        snapshot: &mut SessionSnapshot,
        exercise_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(usize, bool)> {
        let training_id = require_open_training(snapshot)?;
        let exercise_id = match exercise_id {
            Some(id) => id.to_string(),
            None => snapshot
                .user
                .session
                .last_exercise_id
                .clone()
                .ok_or_else(|| AppError::BadRequest("no exercise selected".to_string()))?,
        };
        let exercise = self
            .catalog
            .exercise(&exercise_id)
            .ok_or_else(|| AppError::NotFound(format!("exercise {}", exercise_id)))?;

        let (idx, _) = open_set(snapshot, &training_id, &exercise_id, now)?;
        snapshot.user.session.last_exercise_id = Some(exercise_id);
        Ok((idx, exercise.needs_weight))
    }
}
