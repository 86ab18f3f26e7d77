// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod catalog;
pub mod program;
pub mod report;
pub mod training;
pub mod user;

pub use catalog::{Exercise, MuscleGroup, Program, ProgramGroup, ProgramLevel, Tool};
pub use program::{DayPlan, NextDay, RestAdvisory};
pub use report::{
    JobStatus, Notification, NotificationKind, ReportJob, ReportPeriod, ReportSummary,
    ScorePoint, ScoreReport,
};
pub use training::{
    HistorySet, RepEntry, Training, TrainingHistory, TrainingSummary, WorkoutSet,
};
pub use user::{ActivityLevel, CalculatorDraft, Gender, SessionState, User};
