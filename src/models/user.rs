// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model and the typed per-user session state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::time_utils::rfc3339_micros;

/// User profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Chat user ID (also used as document ID)
    pub user_id: u64,
    /// Display name from the chat front-end
    #[serde(default)]
    pub name: Option<String>,
    /// Interface language ("en", "ru", ...)
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Program the user is currently following
    #[serde(default)]
    pub active_program_id: Option<u32>,
    /// Billing reference, owned by the subscription front-end
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Body weight in kg, used to score body-weight exercises
    #[serde(default)]
    pub body_weight_kg: Option<f64>,
    #[serde(default)]
    pub session: SessionState,
    /// When user first contacted the bot
    #[serde(with = "rfc3339_micros")]
    pub created_at: DateTime<Utc>,
    /// Last time a command was processed for this user
    #[serde(with = "rfc3339_micros")]
    pub last_active: DateTime<Utc>,
}

fn default_locale() -> String {
    "en".to_string()
}

impl User {
    /// Fresh record for a user seen for the first time.
    pub fn new(user_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            name: None,
            locale: default_locale(),
            active_program_id: None,
            subscription_id: None,
            body_weight_kg: None,
            session: SessionState::default(),
            created_at: now,
            last_active: now,
        }
    }
}

/// Everything the controllers remember about a user between commands.
///
/// Each field is independently optional; there is no free-form scratch map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// The single open training, if any
    #[serde(default)]
    pub open_training_id: Option<String>,
    /// Exercise the user worked on most recently
    #[serde(default)]
    pub last_exercise_id: Option<String>,
    /// Remaining exercises of today's program day, next-due last.
    /// `None` means free training; an empty queue means the day is done.
    #[serde(default)]
    pub program_queue: Option<Vec<String>>,
    /// Program days advanced so far; the next day index is this modulo
    /// the program length
    #[serde(default)]
    pub days_completed_in_row: u32,
    /// Local calendar day of the last program advance
    #[serde(default)]
    pub last_program_day: Option<NaiveDate>,
    /// Exact instant of the last program advance
    #[serde(default, with = "rfc3339_micros::option")]
    pub last_program_at: Option<DateTime<Utc>>,
    /// Calculator profile waiting for the user's measurements
    #[serde(default)]
    pub calculator_draft: Option<CalculatorDraft>,
    /// Deliver notifications without sound
    #[serde(default)]
    pub silent: bool,
}

/// Calculator profile picked before the measurements are typed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculatorDraft {
    pub gender: Gender,
    pub activity_level: ActivityLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Daily activity, from couch to gym-dweller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    /// Little or no training
    Sedentary,
    /// Light training 1-3 times a week
    Light,
    /// Moderate work or training 3-5 days a week
    Moderate,
    /// Physical work or hard training 6-7 times a week
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// Multiplier applied to base metabolism.
    pub fn coefficient(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }
}
