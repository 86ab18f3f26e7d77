// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Program scheduler: which day of a program is due, and whether the user
//! has rested long enough to start it.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::config::RestIntervalMode;
use crate::db::{SessionSnapshot, Store};
use crate::error::{AppError, Result};
use crate::models::{DayPlan, NextDay, Program, RestAdvisory, SessionState};
use crate::services::CatalogService;
use crate::time_utils::local_date;

/// How rest is measured and which calendar the user lives in.
#[derive(Debug, Clone, Copy)]
pub struct RestPolicy {
    pub mode: RestIntervalMode,
    pub utc_offset_minutes: i32,
}

impl RestPolicy {
    /// Whole days rested since the last advance, `None` if never advanced.
    fn days_rested(&self, session: &SessionState, now: DateTime<Utc>) -> Option<i64> {
        match self.mode {
            RestIntervalMode::CalendarDays => session
                .last_program_day
                .map(|last| (local_date(now, self.utc_offset_minutes) - last).num_days()),
            RestIntervalMode::ElapsedDays => session
                .last_program_at
                .map(|last| (now - last).num_days()),
        }
    }

    /// First calendar day on which the next program day may start.
    fn next_eligible(&self, session: &SessionState, days_between: u32) -> Option<NaiveDate> {
        let days = Duration::days(i64::from(days_between));
        match self.mode {
            RestIntervalMode::CalendarDays => session.last_program_day.map(|last| last + days),
            RestIntervalMode::ElapsedDays => session
                .last_program_at
                .map(|last| local_date(last + days, self.utc_offset_minutes)),
        }
    }

    /// Instant at which the next program day becomes available.
    pub fn available_at(&self, session: &SessionState, days_between: u32) -> Option<DateTime<Utc>> {
        match self.mode {
            RestIntervalMode::CalendarDays => self
                .next_eligible(session, days_between)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|midnight| {
                    midnight.and_utc() - Duration::minutes(i64::from(self.utc_offset_minutes))
                }),
            RestIntervalMode::ElapsedDays => session
                .last_program_at
                .map(|last| last + Duration::days(i64::from(days_between))),
        }
    }
}

// ─── Transitions ─────────────────────────────────────────────────

/// Make `program` the active one. Starting the already-active program is
/// a no-op; returns whether anything changed.
pub fn activate_program(snapshot: &mut SessionSnapshot, program: &Program) -> Result<bool> {
    match snapshot.user.active_program_id {
        Some(active) if active == program.id => Ok(false),
        Some(active) => Err(AppError::ConflictActiveProgram {
            active_program_id: active,
        }),
        None => {
            snapshot.user.active_program_id = Some(program.id);
            snapshot.user.session.days_completed_in_row = 0;
            snapshot.user.session.program_queue = None;
            Ok(true)
        }
    }
}

/// The day due now, or a rest advisory if the user is still resting.
///
/// Advancing records today as the last program day, bumps the row counter
/// and installs the day's exercise queue.
pub fn advance_day(
    snapshot: &mut SessionSnapshot,
    program: &Program,
    policy: RestPolicy,
    now: DateTime<Utc>,
) -> Result<NextDay> {
    activate_program(snapshot, program)?;

    let session = &mut snapshot.user.session;
    // Time never runs backwards past the last advance
    let now = session.last_program_at.map_or(now, |last| now.max(last));
    let day_index = program.day_index(session.days_completed_in_row);
    let exercises = program.days.get(day_index).cloned().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("program {} has no days", program.id))
    })?;
    let plan = DayPlan::new(program.id, day_index, exercises);

    let days_between = program.days_between_trainings;
    if let Some(rested) = policy.days_rested(session, now) {
        if rested < i64::from(days_between) {
            let next_eligible = policy
                .next_eligible(session, days_between)
                .unwrap_or_else(|| local_date(now, policy.utc_offset_minutes));
            return Ok(NextDay::Rest(RestAdvisory {
                next_eligible,
                days_remaining: i64::from(days_between) - rested,
                plan,
            }));
        }
    }

    session.last_program_day = Some(local_date(now, policy.utc_offset_minutes));
    session.last_program_at = Some(now);
    session.days_completed_in_row += 1;
    session.program_queue = Some(plan.queue.clone());
    Ok(NextDay::Advanced(plan))
}

/// Leave the active program. The rest history is kept so that switching
/// programs does not skip the rest interval.
pub fn deactivate_program(snapshot: &mut SessionSnapshot) -> Option<u32> {
    let previous = snapshot.user.active_program_id.take();
    snapshot.user.session.days_completed_in_row = 0;
    snapshot.user.session.program_queue = None;
    previous
}

// ─── Scheduler ───────────────────────────────────────────────────

/// Runs program transitions against the store.
pub struct ProgramScheduler<'a> {
    db: &'a dyn Store,
    catalog: &'a CatalogService,
    policy: RestPolicy,
}

/// What happened on a successful advance, for scheduling the reminder.
#[derive(Debug, Clone)]
pub struct Advance {
    pub next: NextDay,
    /// Row counter after the advance
    pub days_completed_in_row: u32,
    /// When the following day becomes available
    pub available_at: Option<DateTime<Utc>>,
    pub silent: bool,
}

impl<'a> ProgramScheduler<'a> {
    pub fn new(db: &'a dyn Store, catalog: &'a CatalogService, policy: RestPolicy) -> Self {
        Self {
            db,
            catalog,
            policy,
        }
    }

    fn program(&self, program_id: u32) -> Result<&'a Program> {
        self.catalog
            .program(program_id)
            .ok_or_else(|| AppError::NotFound(format!("program {}", program_id)))
    }

    pub async fn start_program(
        &self,
        user_id: u64,
        program_id: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let program = self.program(program_id)?;
        let changed = self
            .db
            .with_session(user_id, now, |snapshot| {
                snapshot.user.last_active = now;
                activate_program(snapshot, program)
            })
            .await?;

        if changed {
            tracing::info!(user_id, program_id, "Program started");
        }
        Ok(())
    }

    /// Compute and, unless resting, advance to the next day of `program_id`.
    pub async fn next_day(
        &self,
        user_id: u64,
        program_id: u32,
        now: DateTime<Utc>,
    ) -> Result<Advance> {
        let program = self.program(program_id)?;
        let policy = self.policy;

        let advance = self
            .db
            .with_session(user_id, now, |snapshot| {
                snapshot.user.last_active = now;
                let next = advance_day(snapshot, program, policy, now)?;
                let session = &snapshot.user.session;
                Ok(Advance {
                    next,
                    days_completed_in_row: session.days_completed_in_row,
                    available_at: policy.available_at(session, program.days_between_trainings),
                    silent: session.silent,
                })
            })
            .await?;

        match &advance.next {
            NextDay::Advanced(plan) => tracing::info!(
                user_id,
                program_id,
                day_index = plan.day_index,
                days_completed_in_row = advance.days_completed_in_row,
                "Program day advanced"
            ),
            NextDay::Rest(advisory) => tracing::info!(
                user_id,
                program_id,
                next_eligible = %advisory.next_eligible,
                "Rest advisory issued"
            ),
        }
        Ok(advance)
    }

    pub async fn stop_program(&self, user_id: u64, now: DateTime<Utc>) -> Result<Option<u32>> {
        let stopped = self
            .db
            .with_session(user_id, now, |snapshot| {
                snapshot.user.last_active = now;
                Ok(deactivate_program(snapshot))
            })
            .await?;

        if let Some(program_id) = stopped {
            tracing::info!(user_id, program_id, "Program stopped");
        }
        Ok(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::TimeZone;

    fn program(days: usize, days_between: u32) -> Program {
        Program {
            id: 7,
            group_id: "mass".to_string(),
            level_id: "beginner".to_string(),
            days: (0..days)
                .map(|d| vec![format!("a{}", d), format!("b{}", d)])
                .collect(),
            days_between_trainings: days_between,
        }
    }

    fn calendar() -> RestPolicy {
        RestPolicy {
            mode: RestIntervalMode::CalendarDays,
            utc_offset_minutes: 0,
        }
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot::new(User::new(1, Utc::now()), None, Vec::new())
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_day_index_wraps() {
        let program = program(3, 0);
        let mut snap = snapshot();
        snap.user.active_program_id = Some(7);
        snap.user.session.days_completed_in_row = 4;

        match advance_day(&mut snap, &program, calendar(), at(10, 9, 0)).unwrap() {
            NextDay::Advanced(plan) => {
                assert_eq!(plan.day_index, 1);
                assert_eq!(plan.exercises, vec!["a1", "b1"]);
                assert_eq!(plan.queue, vec!["b1", "a1"]);
            }
            other => panic!("expected advance, got {:?}", other),
        }
        assert_eq!(snap.user.session.days_completed_in_row, 5);
        assert_eq!(
            snap.user.session.program_queue,
            Some(vec!["b1".to_string(), "a1".to_string()])
        );
    }

    #[test]
    fn test_first_advance_starts_program_at_day_zero() {
        let program = program(2, 2);
        let mut snap = snapshot();

        let next = advance_day(&mut snap, &program, calendar(), at(10, 9, 0)).unwrap();
        assert!(matches!(next, NextDay::Advanced(ref plan) if plan.day_index == 0));
        assert_eq!(snap.user.active_program_id, Some(7));
        assert_eq!(
            snap.user.session.last_program_day,
            NaiveDate::from_ymd_opt(2026, 5, 10)
        );
    }

    #[test]
    fn test_rest_advisory_does_not_advance() {
        let program = program(3, 3);
        let mut snap = snapshot();
        advance_day(&mut snap, &program, calendar(), at(9, 18, 0)).unwrap();

        let next = advance_day(&mut snap, &program, calendar(), at(10, 9, 0)).unwrap();
        match next {
            NextDay::Rest(advisory) => {
                assert_eq!(advisory.next_eligible, NaiveDate::from_ymd_opt(2026, 5, 12).unwrap());
                assert_eq!(advisory.days_remaining, 2);
                assert_eq!(advisory.plan.day_index, 1);
            }
            other => panic!("expected rest, got {:?}", other),
        }
        assert_eq!(snap.user.session.days_completed_in_row, 1);
    }

    #[test]
    fn test_clock_behind_last_advance_never_shortens_rest() {
        let program = program(3, 2);
        let mut snap = snapshot();
        advance_day(&mut snap, &program, calendar(), at(10, 9, 0)).unwrap();

        // A day earlier than the recorded advance counts as no rest at all
        match advance_day(&mut snap, &program, calendar(), at(9, 9, 0)).unwrap() {
            NextDay::Rest(advisory) => {
                assert_eq!(advisory.days_remaining, 2);
                assert_eq!(advisory.next_eligible, NaiveDate::from_ymd_opt(2026, 5, 12).unwrap());
            }
            other => panic!("expected rest, got {:?}", other),
        }
        assert_eq!(snap.user.session.last_program_at, Some(at(10, 9, 0)));
        assert_eq!(snap.user.session.days_completed_in_row, 1);
    }

    #[test]
    fn test_rest_elapses_on_calendar_days() {
        let program = program(3, 1);
        let mut snap = snapshot();
        advance_day(&mut snap, &program, calendar(), at(9, 23, 50)).unwrap();

        // Twenty minutes later is already the next calendar day.
        let next = advance_day(&mut snap, &program, calendar(), at(10, 0, 10)).unwrap();
        assert!(matches!(next, NextDay::Advanced(_)));
    }

    #[test]
    fn test_rest_on_elapsed_days_rounds_down() {
        let policy = RestPolicy {
            mode: RestIntervalMode::ElapsedDays,
            utc_offset_minutes: 0,
        };
        let program = program(3, 1);
        let mut snap = snapshot();
        advance_day(&mut snap, &program, policy, at(9, 23, 50)).unwrap();

        let next = advance_day(&mut snap, &program, policy, at(10, 23, 0)).unwrap();
        assert!(matches!(next, NextDay::Rest(_)));
        let next = advance_day(&mut snap, &program, policy, at(10, 23, 50)).unwrap();
        assert!(matches!(next, NextDay::Advanced(_)));
    }

    #[test]
    fn test_conflicting_program_is_rejected() {
        let mut snap = snapshot();
        snap.user.active_program_id = Some(3);

        let err = advance_day(&mut snap, &program(2, 0), calendar(), at(10, 9, 0)).unwrap_err();
        assert!(matches!(
            err,
            AppError::ConflictActiveProgram {
                active_program_id: 3
            }
        ));
        assert_eq!(snap.user.session.days_completed_in_row, 0);
    }

    #[test]
    fn test_activate_is_idempotent() {
        let program = program(2, 0);
        let mut snap = snapshot();
        assert!(activate_program(&mut snap, &program).unwrap());
        snap.user.session.days_completed_in_row = 3;
        assert!(!activate_program(&mut snap, &program).unwrap());
        assert_eq!(snap.user.session.days_completed_in_row, 3);
    }

    #[test]
    fn test_stop_keeps_rest_history() {
        let program = program(2, 2);
        let mut snap = snapshot();
        advance_day(&mut snap, &program, calendar(), at(10, 9, 0)).unwrap();

        assert_eq!(deactivate_program(&mut snap), Some(7));
        assert_eq!(deactivate_program(&mut snap), None);
        assert_eq!(snap.user.session.days_completed_in_row, 0);
        assert_eq!(snap.user.session.program_queue, None);
        assert!(snap.user.session.last_program_day.is_some());
    }

    #[test]
    fn test_available_at_respects_offset() {
        let policy = RestPolicy {
            mode: RestIntervalMode::CalendarDays,
            utc_offset_minutes: 120,
        };
        let session = SessionState {
            last_program_day: NaiveDate::from_ymd_opt(2026, 5, 10),
            ..Default::default()
        };
        // Local midnight on the 12th is 22:00 UTC on the 11th.
        assert_eq!(policy.available_at(&session, 2), Some(at(11, 22, 0)));
    }
}
