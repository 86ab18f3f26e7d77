// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise and program reference data.

use serde::{Deserialize, Serialize};

/// Muscle group an exercise trains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleGroup {
    pub id: String,
    pub name: String,
}

/// Equipment used for an exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    /// Whether a rep entry must carry an external weight
    #[serde(default)]
    pub needs_weight: bool,
}

/// A single exercise, resolved against its group and tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    pub group_id: String,
    pub tool_id: String,
    /// Copied from the tool at catalog load
    pub needs_weight: bool,
}

/// Program family, e.g. "Mass gain".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramGroup {
    pub id: String,
    pub name: String,
    /// Minimum rest between program days, in whole days
    pub days_between_trainings: u32,
}

/// Difficulty tier, e.g. "Beginner".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramLevel {
    pub id: String,
    pub name: String,
}

/// An ordered cycle of days, each a fixed list of exercise IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: u32,
    pub group_id: String,
    pub level_id: String,
    pub days: Vec<Vec<String>>,
    /// Copied from the program group at catalog load
    pub days_between_trainings: u32,
}

impl Program {
    /// Day due after `days_completed` advances. Wraps around the cycle.
    pub fn day_index(&self, days_completed: u32) -> usize {
        // Catalog validation guarantees at least one day.
        days_completed as usize % self.days.len().max(1)
    }
}
