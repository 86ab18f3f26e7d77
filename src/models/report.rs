// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Score reports, the background jobs that build them, and the
//! notifications that announce them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::time_utils::rfc3339_micros;

/// Reporting window, selected by an integer flag on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ReportPeriod {
    Months(u32),
    AllTime,
}

impl ReportPeriod {
    pub const ONE_MONTH: Self = Self::Months(1);
    pub const THREE_MONTHS: Self = Self::Months(3);

    /// Earliest training `created` included, `None` for all-time.
    /// A month is counted as 30 days.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Months(months) => Some(now - chrono::Duration::days(30 * i64::from(*months))),
            Self::AllTime => None,
        }
    }
}

impl TryFrom<i32> for ReportPeriod {
    type Error = String;

    fn try_from(flag: i32) -> Result<Self, Self::Error> {
        match flag {
            -1 => Ok(Self::AllTime),
            1 | 3 => Ok(Self::Months(flag as u32)),
            other => Err(format!("unsupported report period {}", other)),
        }
    }
}

impl From<ReportPeriod> for i32 {
    fn from(period: ReportPeriod) -> Self {
        match period {
            ReportPeriod::Months(m) => m as i32,
            ReportPeriod::AllTime => -1,
        }
    }
}

/// One set's score on the day it was performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub score: i64,
    #[serde(with = "rfc3339_micros")]
    pub date: DateTime<Utc>,
}

/// Counters over the trainings in the period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_trainings: usize,
    pub total_sets: usize,
    pub mean_training_duration_secs: f64,
    pub mean_gap_days: f64,
}

/// Everything the chart renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub period: ReportPeriod,
    /// group -> exercise -> points in training order
    pub series: BTreeMap<String, BTreeMap<String, Vec<ScorePoint>>>,
    /// exercise -> best set score in the period
    pub max_scores: BTreeMap<String, i64>,
    pub summary: ReportSummary,
}

impl ScoreReport {
    pub fn is_empty(&self) -> bool {
        self.summary.total_trainings == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

/// A queued report build, stored so the front-end can poll it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportJob {
    /// Document ID
    pub job_id: String,
    pub user_id: u64,
    pub period: ReportPeriod,
    pub status: JobStatus,
    #[serde(default)]
    pub report: Option<ScoreReport>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(with = "rfc3339_micros")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_micros::option")]
    pub completed_at: Option<DateTime<Utc>>,
    /// The `ReportReady` notification went out
    #[serde(default)]
    pub notified: bool,
}

impl ReportJob {
    pub fn pending(user_id: u64, period: ReportPeriod, now: DateTime<Utc>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            period,
            status: JobStatus::Pending,
            report: None,
            error: None,
            created_at: now,
            completed_at: None,
            notified: false,
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    ReportReady { job_id: String },
    ProgramDayAvailable { program_id: u32, date: NaiveDate },
}

/// A message waiting for the front-end to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Document ID
    pub id: String,
    pub user_id: u64,
    #[serde(flatten)]
    pub kind: NotificationKind,
    /// Deliver without sound
    pub silent: bool,
    #[serde(with = "rfc3339_micros")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: u64, kind: NotificationKind, silent: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind,
            silent,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_period_flags() {
        assert_eq!(ReportPeriod::try_from(-1).unwrap(), ReportPeriod::AllTime);
        assert_eq!(ReportPeriod::try_from(3).unwrap(), ReportPeriod::THREE_MONTHS);
        assert!(ReportPeriod::try_from(2).is_err());
        assert!(ReportPeriod::try_from(0).is_err());

        let parsed: ReportPeriod = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, ReportPeriod::ONE_MONTH);
        assert_eq!(serde_json::to_string(&ReportPeriod::AllTime).unwrap(), "-1");
    }

    #[test]
    fn test_period_window() {
        let now = Utc::now();
        assert_eq!(ReportPeriod::AllTime.since(now), None);
        assert_eq!(
            ReportPeriod::THREE_MONTHS.since(now),
            Some(now - chrono::Duration::days(90))
        );
    }

    #[test]
    fn test_notification_wire_shape() {
        let n = Notification::new(
            5,
            NotificationKind::ReportReady {
                job_id: "abc".to_string(),
            },
            true,
            Utc::now(),
        );
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["kind"], "report_ready");
        assert_eq!(value["job_id"], "abc");
        assert_eq!(value["silent"], true);
    }
}
