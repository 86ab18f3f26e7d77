// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile and session state)
//! - Trainings and Sets (session transactions)
//! - Report jobs
//! - Notifications (outbox for the chat front-end)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::{FirestoreConsistencySelector, FirestoreQueryDirection};
use std::time::Duration;

use crate::db::{collections, SessionOp, SessionSnapshot, Store};
use crate::error::AppError;
use crate::models::{Notification, ReportJob, Training, User, WorkoutSet};

/// First retry delay for a conflicting session transaction; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    max_tx_attempts: u32,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, max_tx_attempts: u32) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, max_tx_attempts).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            max_tx_attempts,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
        max_tx_attempts: u32,
    ) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            max_tx_attempts,
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            max_tx_attempts: 1,
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Session Transaction Helpers ─────────────────────────────

    /// Read the snapshot through `db`, which is bound to a transaction so
    /// every document read here is checked for conflicts at commit.
    async fn load_snapshot(
        db: &firestore::FirestoreDb,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> Result<SessionSnapshot, AppError> {
        let user: Option<User> = db
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(format!("Failed to read user in transaction: {}", e)))?;
        let user = user.unwrap_or_else(|| User::new(user_id, now));

        let training: Option<Training> = match user.session.open_training_id.as_deref() {
            Some(training_id) => db
                .fluent()
                .select()
                .by_id_in(collections::TRAININGS)
                .obj()
                .one(training_id)
                .await
                .map_err(|e| {
                    AppError::Database(format!("Failed to read training in transaction: {}", e))
                })?,
            None => None,
        };

        let sets: Vec<WorkoutSet> = match &training {
            Some(training) => {
                let training_id = training.id.clone();
                db.fluent()
                    .select()
                    .from(collections::SETS)
                    .filter(move |q| q.for_all([q.field("training_id").eq(training_id.clone())]))
                    .order_by([("created", FirestoreQueryDirection::Ascending)])
                    .obj()
                    .query()
                    .await
                    .map_err(|e| {
                        AppError::Database(format!("Failed to read sets in transaction: {}", e))
                    })?
            }
            None => Vec::new(),
        };

        Ok(SessionSnapshot::new(user, training, sets))
    }

    /// Add every write implied by `snapshot` to the transaction.
    fn stage_snapshot(
        &self,
        snapshot: &SessionSnapshot,
        transaction: &mut firestore::FirestoreTransaction<'_>,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;

        for set_id in snapshot.removed_set_ids() {
            client
                .fluent()
                .delete()
                .from(collections::SETS)
                .document_id(&set_id)
                .add_to_transaction(transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add set deletion to transaction: {}", e))
                })?;
        }

        for set in &snapshot.sets {
            client
                .fluent()
                .update()
                .in_col(collections::SETS)
                .document_id(&set.id)
                .object(set)
                .add_to_transaction(transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add set to transaction: {}", e))
                })?;
        }

        if let Some(training) = &snapshot.training {
            client
                .fluent()
                .update()
                .in_col(collections::TRAININGS)
                .document_id(&training.id)
                .object(training)
                .add_to_transaction(transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add training to transaction: {}", e))
                })?;
        }

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(snapshot.user.user_id.to_string())
            .object(&snapshot.user)
            .add_to_transaction(transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl Store for FirestoreDb {
    /// Runs the whole read-modify-write in one Firestore transaction.
    ///
    /// A failed commit (usually a conflict with a concurrent command for the
    /// same user) is retried on fresh data with exponential backoff, up to
    /// the configured number of attempts. An error from `op` is returned
    /// immediately without retrying.
    async fn transact_session(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
        op: &mut SessionOp<'_>,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let tx_db = client.clone_with_consistency_selector(
                FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
            );

            let staged = async {
                let mut snapshot = Self::load_snapshot(&tx_db, user_id, now).await?;
                op(&mut snapshot)?;
                self.stage_snapshot(&snapshot, &mut transaction)
            }
            .await;

            if let Err(e) = staged {
                let _ = transaction.rollback().await;
                return Err(e);
            }

            match transaction.commit().await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.max_tx_attempts => {
                    tracing::warn!(
                        user_id,
                        attempt,
                        error = %e,
                        "Session transaction commit failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Transaction commit failed after {} attempts: {}",
                        attempt, e
                    )));
                }
            }
        }
    }

    async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_training(&self, training_id: &str) -> Result<Option<Training>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TRAININGS)
            .obj()
            .one(training_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn closed_trainings(
        &self,
        user_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Training>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRAININGS);

        // Stored timestamps are fixed-width RFC3339, so string order is time order.
        let query = if let Some(since) = since {
            let since = since.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
            query.filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("created").greater_than_or_equal(since.clone()),
                ])
            })
        } else {
            query.filter(move |q| q.field("user_id").eq(user_id))
        };

        let trainings: Vec<Training> = query
            .order_by([("created", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // The open training (if any) is filtered here rather than in the
        // query, which keeps the composite index to (user_id, created).
        Ok(trainings.into_iter().filter(|t| !t.is_open()).collect())
    }

    async fn recent_closed_trainings(
        &self,
        user_id: u64,
        limit: usize,
    ) -> Result<Vec<Training>, AppError> {
        // One extra row covers the open training, which sorts first.
        let trainings: Vec<Training> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRAININGS)
            .filter(move |q| q.field("user_id").eq(user_id))
            .order_by([("created", FirestoreQueryDirection::Descending)])
            .limit(limit.saturating_add(1) as u32)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(trainings
            .into_iter()
            .filter(|t| !t.is_open())
            .take(limit)
            .collect())
    }

    async fn sets_for_training(&self, training_id: &str) -> Result<Vec<WorkoutSet>, AppError> {
        let training_id = training_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SETS)
            .filter(move |q| q.for_all([q.field("training_id").eq(training_id.clone())]))
            .order_by([("created", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn last_closed_set(
        &self,
        user_id: u64,
        exercise_id: &str,
    ) -> Result<Option<WorkoutSet>, AppError> {
        let exercise_id = exercise_id.to_string();
        // At most one set per exercise is open, so the newest closed one is
        // always within the two most recent.
        let sets: Vec<WorkoutSet> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SETS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("exercise_id").eq(exercise_id.clone()),
                ])
            })
            .order_by([("created", FirestoreQueryDirection::Descending)])
            .limit(2)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(sets.into_iter().find(|s| !s.is_open()))
    }

    async fn put_report_job(&self, job: &ReportJob) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::REPORT_JOBS)
            .document_id(&job.job_id)
            .object(job)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_report_job(&self, job_id: &str) -> Result<Option<ReportJob>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::REPORT_JOBS)
            .obj()
            .one(job_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn push_notification(&self, notification: &Notification) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::NOTIFICATIONS)
            .document_id(&notification.id)
            .object(notification)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Reads and deletes in one transaction so two concurrent drains never
    /// deliver the same notification twice.
    async fn drain_notifications(&self, user_id: u64) -> Result<Vec<Notification>, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
        let tx_db = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );

        let pending: Vec<Notification> = match tx_db
            .fluent()
            .select()
            .from(collections::NOTIFICATIONS)
            .filter(move |q| q.field("user_id").eq(user_id))
            .order_by([("created_at", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(AppError::Database(e.to_string()));
            }
        };

        if pending.is_empty() {
            let _ = transaction.rollback().await;
            return Ok(pending);
        }

        for notification in &pending {
            client
                .fluent()
                .delete()
                .from(collections::NOTIFICATIONS)
                .document_id(&notification.id)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!(
                        "Failed to add notification deletion to transaction: {}",
                        e
                    ))
                })?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(user_id, count = pending.len(), "Drained notifications");

        Ok(pending)
    }
}
