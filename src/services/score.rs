// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Score engine: turns recorded sets into comparable efficiency scores
//! and per-period reports.
//!
//! Everything here is pure. Callers fetch the history and hand it in.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::{
    ReportPeriod, ReportSummary, ScorePoint, ScoreReport, Training, WorkoutSet,
};
use crate::services::CatalogService;

pub const BASE_COEFFICIENT: f64 = 1.0278;
pub const REP_COEFFICIENT: f64 = 0.0278;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// The bot's house efficiency metric.
///
/// `round(weight / (1.0278 - 0.0278 * reps / 10) * 100)`, rounding half to
/// even so reports match the historical ones exactly.
pub fn score(weight: f64, reps: u32) -> i64 {
    let denominator = BASE_COEFFICIENT - REP_COEFFICIENT * f64::from(reps) / 10.0;
    (weight / denominator * 100.0).round_ties_even() as i64
}

/// Weight used for scoring an entry: the recorded one, or the user's body
/// weight when nothing was recorded.
pub fn effective_weight(recorded: f64, body_weight_kg: f64) -> f64 {
    if recorded > 0.0 {
        recorded
    } else {
        body_weight_kg
    }
}

/// Σ entry scores of a set.
pub fn set_score(set: &WorkoutSet, body_weight_kg: f64) -> i64 {
    set.entries
        .iter()
        .map(|e| score(effective_weight(e.weight, body_weight_kg), e.reps))
        .sum()
}

/// A training together with its sets.
#[derive(Debug, Clone)]
pub struct TrainingRecord {
    pub training: Training,
    pub sets: Vec<WorkoutSet>,
}

/// Build the report for `period` out of a user's history.
///
/// Open trainings and trainings created before the period are ignored.
/// Series are keyed by group name, then exercise name; exercises no longer
/// in the catalog fall back to their id.
pub fn aggregate(
    period: ReportPeriod,
    now: DateTime<Utc>,
    history: &[TrainingRecord],
    catalog: &CatalogService,
    body_weight_kg: f64,
) -> ScoreReport {
    let since = period.since(now);
    let mut records: Vec<&TrainingRecord> = history
        .iter()
        .filter(|r| !r.training.is_open())
        .filter(|r| since.map_or(true, |since| r.training.created >= since))
        .collect();
    records.sort_by_key(|r| r.training.created);

    let mut series: BTreeMap<String, BTreeMap<String, Vec<ScorePoint>>> = BTreeMap::new();
    let mut max_scores: BTreeMap<String, i64> = BTreeMap::new();
    let mut total_sets = 0;
    let mut total_duration = 0.0;

    for record in &records {
        total_duration += record.training.duration_secs().unwrap_or(0.0);
        total_sets += record.sets.len();

        for set in &record.sets {
            let (group, exercise) = match catalog.exercise(&set.exercise_id) {
                Some(exercise) => (
                    catalog
                        .group_name(&exercise.group_id)
                        .unwrap_or(&exercise.group_id)
                        .to_string(),
                    exercise.name.clone(),
                ),
                None => ("other".to_string(), set.exercise_id.clone()),
            };

            let score = set_score(set, body_weight_kg);
            let best = max_scores.entry(exercise.clone()).or_insert(0);
            *best = (*best).max(score);

            series
                .entry(group)
                .or_default()
                .entry(exercise)
                .or_default()
                .push(ScorePoint {
                    score,
                    date: set.created,
                });
        }
    }

    let total_trainings = records.len();
    let gaps: f64 = records
        .windows(2)
        .map(|pair| (pair[1].training.created - pair[0].training.created).num_seconds() as f64)
        .sum();

    let summary = if total_trainings == 0 {
        ReportSummary::default()
    } else {
        ReportSummary {
            total_trainings,
            total_sets,
            mean_training_duration_secs: total_duration / total_trainings as f64,
            mean_gap_days: gaps / (total_trainings.saturating_sub(1).max(1)) as f64
                / SECONDS_PER_DAY,
        }
    };

    ScoreReport {
        period,
        series,
        max_scores,
        summary,
    }
}
