// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local store for development and tests.
//!
//! Session transactions are serialized per user with an async mutex and
//! applied to clones, so a failing operation leaves nothing behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{SessionOp, SessionSnapshot, Store};
use crate::error::Result;
use crate::models::{Notification, ReportJob, Training, User, WorkoutSet};

#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<u64, User>,
    trainings: DashMap<String, Training>,
    sets: DashMap<String, WorkoutSet>,
    report_jobs: DashMap<String, ReportJob>,
    notifications: DashMap<u64, Vec<Notification>>,
    /// One lock per user, held for the whole session transaction
    user_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of open trainings a user has. Used by invariant tests.
    pub fn open_training_count(&self, user_id: u64) -> usize {
        self.trainings
            .iter()
            .filter(|t| t.user_id == user_id && t.is_open())
            .count()
    }

    /// Every set stored for a training, regardless of state.
    pub fn all_sets(&self, training_id: &str) -> Vec<WorkoutSet> {
        let mut sets: Vec<WorkoutSet> = self
            .sets
            .iter()
            .filter(|s| s.training_id == training_id)
            .map(|s| s.clone())
            .collect();
        sets.sort_by(|a, b| a.created.cmp(&b.created));
        sets
    }

    /// Insert a training with its sets directly, bypassing the controller.
    pub fn seed_training(&self, training: Training, sets: Vec<WorkoutSet>) {
        for set in sets {
            self.sets.insert(set.id.clone(), set);
        }
        self.trainings.insert(training.id.clone(), training);
    }
}

#[async_trait]
impl Store for MemoryDb {
    async fn transact_session(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
        op: &mut SessionOp<'_>,
    ) -> Result<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let user = self
            .users
            .get(&user_id)
            .map(|u| u.clone())
            .unwrap_or_else(|| User::new(user_id, now));

        let training = user
            .session
            .open_training_id
            .as_deref()
            .and_then(|id| self.trainings.get(id).map(|t| t.clone()));

        let sets = match &training {
            Some(t) => self.sets_for_training(&t.id).await?,
            None => Vec::new(),
        };

        let mut snapshot = SessionSnapshot::new(user, training, sets);
        op(&mut snapshot)?;

        for id in snapshot.removed_set_ids() {
            self.sets.remove(&id);
        }
        for set in &snapshot.sets {
            self.sets.insert(set.id.clone(), set.clone());
        }
        if let Some(training) = &snapshot.training {
            self.trainings.insert(training.id.clone(), training.clone());
        }
        self.users.insert(user_id, snapshot.user);

        Ok(())
    }

    async fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_training(&self, training_id: &str) -> Result<Option<Training>> {
        Ok(self.trainings.get(training_id).map(|t| t.clone()))
    }

    async fn closed_trainings(
        &self,
        user_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Training>> {
        let mut trainings: Vec<Training> = self
            .trainings
            .iter()
            .filter(|t| t.user_id == user_id && !t.is_open())
            .filter(|t| since.map_or(true, |since| t.created >= since))
            .map(|t| t.clone())
            .collect();
        trainings.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(trainings)
    }

    async fn recent_closed_trainings(&self, user_id: u64, limit: usize) -> Result<Vec<Training>> {
        let mut trainings = self.closed_trainings(user_id, None).await?;
        trainings.reverse();
        trainings.truncate(limit);
        Ok(trainings)
    }

    async fn sets_for_training(&self, training_id: &str) -> Result<Vec<WorkoutSet>> {
        Ok(self.all_sets(training_id))
    }

    async fn last_closed_set(
        &self,
        user_id: u64,
        exercise_id: &str,
    ) -> Result<Option<WorkoutSet>> {
        Ok(self
            .sets
            .iter()
            .filter(|s| s.user_id == user_id && s.exercise_id == exercise_id)
            .filter(|s| s.end.is_some())
            .max_by_key(|s| s.end)
            .map(|s| s.clone()))
    }

    async fn put_report_job(&self, job: &ReportJob) -> Result<()> {
        self.report_jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_report_job(&self, job_id: &str) -> Result<Option<ReportJob>> {
        Ok(self.report_jobs.get(job_id).map(|j| j.clone()))
    }

    async fn push_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .entry(notification.user_id)
            .or_default()
            .push(notification.clone());
        Ok(())
    }

    async fn drain_notifications(&self, user_id: u64) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .remove(&user_id)
            .map(|(_, pending)| pending)
            .unwrap_or_default())
    }
}
