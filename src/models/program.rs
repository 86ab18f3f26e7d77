// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Results handed out by the program scheduler.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The exercises due for one program day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub program_id: u32,
    pub day_index: usize,
    /// In the order the program lists them
    pub exercises: Vec<String>,
    /// Same exercises, most-recent-first: the next due one is last
    pub queue: Vec<String>,
}

impl DayPlan {
    pub fn new(program_id: u32, day_index: usize, exercises: Vec<String>) -> Self {
        let queue = exercises.iter().rev().cloned().collect();
        Self {
            program_id,
            day_index,
            exercises,
            queue,
        }
    }
}

/// The minimum rest has not elapsed yet. Not an error: the plan is still
/// shown read-only and nothing advanced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestAdvisory {
    pub next_eligible: NaiveDate,
    pub days_remaining: i64,
    pub plan: DayPlan,
}

/// Outcome of asking for the next program day.
#[derive(Debug, Clone, PartialEq)]
pub enum NextDay {
    Advanced(DayPlan),
    Rest(RestAdvisory),
}
