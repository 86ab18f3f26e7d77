// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training sessions and the exercise sets recorded inside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time_utils::rfc3339_micros;

/// One workout session. Open while `end` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Training {
    /// Document ID
    pub id: String,
    pub user_id: u64,
    #[serde(with = "rfc3339_micros")]
    pub created: DateTime<Utc>,
    #[serde(default, with = "rfc3339_micros::option")]
    pub end: Option<DateTime<Utc>>,
}

impl Training {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Wall-clock length of a closed training.
    pub fn duration_secs(&self) -> Option<f64> {
        self.end
            .map(|end| (end - self.created).num_milliseconds() as f64 / 1000.0)
    }
}

/// A single `{reps, weight, timestamp}` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepEntry {
    pub reps: u32,
    /// Kilograms; 0 for body-weight exercises
    pub weight: f64,
    /// Epoch seconds
    pub timestamp: f64,
}

/// One exercise's worth of rep entries within a training.
///
/// Entries are append-only except for replacing the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    /// Document ID
    pub id: String,
    pub user_id: u64,
    pub training_id: String,
    pub exercise_id: String,
    #[serde(default)]
    pub entries: Vec<RepEntry>,
    #[serde(with = "rfc3339_micros")]
    pub created: DateTime<Utc>,
    #[serde(default, with = "rfc3339_micros::option")]
    pub end: Option<DateTime<Utc>>,
}

impl WorkoutSet {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Σ weight × reps over all entries.
    pub fn weight_lifted(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.weight * f64::from(e.reps))
            .sum()
    }

    /// Time between the first and the last entry, zero for fewer than two.
    pub fn duration_secs(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Gaps between consecutive entries.
    pub fn rest_intervals(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries
            .windows(2)
            .map(|pair| pair[1].timestamp - pair[0].timestamp)
    }
}

/// Returned by `end_training`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub training_id: String,
    /// Σ weight × reps over every kept set
    pub weight_lifted: f64,
    /// Distinct exercises with at least one entry, in first-touched order
    pub exercises: Vec<String>,
    pub training_duration_secs: f64,
    pub mean_set_duration_secs: f64,
    pub mean_rest_secs: f64,
}

/// A closed training as listed in the user's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub training_id: String,
    pub created: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub sets: Vec<HistorySet>,
}

/// Display names of one set's exercise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySet {
    pub exercise_id: String,
    pub group: String,
    pub tool: String,
    pub exercise: String,
}
