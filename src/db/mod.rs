// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Handlers talk to a [`Store`]; production uses Firestore, development and
//! tests use the in-process [`MemoryDb`].

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::models::{Notification, ReportJob, Training, User, WorkoutSet};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TRAININGS: &str = "trainings";
    pub const SETS: &str = "sets";
    pub const REPORT_JOBS: &str = "report_jobs";
    /// Outbox drained by the chat front-end
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Everything a session command may read or change, loaded in one
/// transaction: the user, their open training and that training's sets.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user: User,
    pub training: Option<Training>,
    pub sets: Vec<WorkoutSet>,
    loaded_set_ids: HashSet<String>,
}

impl SessionSnapshot {
    pub fn new(user: User, training: Option<Training>, sets: Vec<WorkoutSet>) -> Self {
        let loaded_set_ids = sets.iter().map(|s| s.id.clone()).collect();
        Self {
            user,
            training,
            sets,
            loaded_set_ids,
        }
    }

    /// Sets that were loaded but dropped from `sets` by the operation.
    pub fn removed_set_ids(&self) -> Vec<String> {
        let kept: HashSet<&str> = self.sets.iter().map(|s| s.id.as_str()).collect();
        let mut removed: Vec<String> = self
            .loaded_set_ids
            .iter()
            .filter(|id| !kept.contains(id.as_str()))
            .cloned()
            .collect();
        removed.sort();
        removed
    }
}

/// Operation run inside [`Store::transact_session`]. May be run more than
/// once if the transaction is retried.
pub type SessionOp<'a> = dyn FnMut(&mut SessionSnapshot) -> Result<()> + Send + 'a;

/// Persistence seam.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the user's session snapshot, apply `op` and commit every change
    /// atomically. Nothing is written if `op` fails. A user seen for the
    /// first time is created.
    async fn transact_session(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
        op: &mut SessionOp<'_>,
    ) -> Result<()>;

    async fn get_user(&self, user_id: u64) -> Result<Option<User>>;

    async fn get_training(&self, training_id: &str) -> Result<Option<Training>>;

    /// Closed trainings created at or after `since`, oldest first.
    async fn closed_trainings(
        &self,
        user_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Training>>;

    /// The `limit` most recent closed trainings, newest first.
    async fn recent_closed_trainings(&self, user_id: u64, limit: usize) -> Result<Vec<Training>>;

    /// Sets of a training, oldest first.
    async fn sets_for_training(&self, training_id: &str) -> Result<Vec<WorkoutSet>>;

    /// Most recently closed set of an exercise.
    async fn last_closed_set(&self, user_id: u64, exercise_id: &str)
        -> Result<Option<WorkoutSet>>;

    async fn put_report_job(&self, job: &ReportJob) -> Result<()>;

    async fn get_report_job(&self, job_id: &str) -> Result<Option<ReportJob>>;

    async fn push_notification(&self, notification: &Notification) -> Result<()>;

    /// Remove and return the user's pending notifications, oldest first.
    async fn drain_notifications(&self, user_id: u64) -> Result<Vec<Notification>>;
}

impl<'s> dyn Store + 's {
    /// Run `op` in a session transaction and hand back what it produced on
    /// the attempt that committed.
    pub async fn with_session<R, F>(&self, user_id: u64, now: DateTime<Utc>, mut op: F) -> Result<R>
    where
        R: Send,
        F: FnMut(&mut SessionSnapshot) -> Result<R> + Send,
    {
        let mut output = None;
        self.transact_session(user_id, now, &mut |snapshot| {
            output = Some(op(snapshot)?);
            Ok(())
        })
        .await?;
        output.ok_or_else(|| AppError::Internal(anyhow::anyhow!("session op produced no output")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_set_ids() {
        let now = Utc::now();
        let set = |id: &str| WorkoutSet {
            id: id.to_string(),
            user_id: 1,
            training_id: "t".to_string(),
            exercise_id: "squat".to_string(),
            entries: vec![],
            created: now,
            end: None,
        };
        let mut snapshot = SessionSnapshot::new(User::new(1, now), None, vec![set("a"), set("b")]);
        assert!(snapshot.removed_set_ids().is_empty());

        snapshot.sets.retain(|s| s.id != "a");
        snapshot.sets.push(set("c"));
        assert_eq!(snapshot.removed_set_ids(), vec!["a".to_string()]);
    }
}
