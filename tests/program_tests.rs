// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Program scheduler and reminder tests against the in-memory store.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use gym_buddy::db::Store;
use gym_buddy::error::AppError;
use gym_buddy::models::{NextDay, NotificationKind};
use gym_buddy::services::jobs;
use gym_buddy::services::tasks::ProgramReminderPayload;
use pretty_assertions::assert_eq;

mod common;

/// "Mass gain / Beginner": three days, two days of rest between them.
const MASS_BEGINNER: u32 = 1;
const STRENGTH_BEGINNER: u32 = 3;

fn monday() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_rotation_wraps_around() {
    let app = common::create_test_app();
    let user_id = 801;

    app.state
        .db
        .with_session(user_id, monday(), |snapshot| {
            snapshot.user.active_program_id = Some(MASS_BEGINNER);
            snapshot.user.session.days_completed_in_row = 4;
            Ok(())
        })
        .await
        .unwrap();

    let advance = app
        .state
        .scheduler()
        .next_day(user_id, MASS_BEGINNER, monday())
        .await
        .unwrap();

    let NextDay::Advanced(plan) = advance.next else {
        panic!("expected an advance, got {:?}", advance.next);
    };
    assert_eq!(plan.day_index, 1);
    assert_eq!(plan.exercises, vec!["squat", "leg_press", "lunge"]);
    assert_eq!(advance.days_completed_in_row, 5);
    assert_eq!(
        advance.available_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_rest_advisory_leaves_counter_alone() {
    let app = common::create_test_app();
    let user_id = 802;
    let scheduler = app.state.scheduler();

    scheduler
        .next_day(user_id, MASS_BEGINNER, monday())
        .await
        .unwrap();

    let tuesday = monday() + Duration::days(1);
    let advance = scheduler
        .next_day(user_id, MASS_BEGINNER, tuesday)
        .await
        .unwrap();
    let NextDay::Rest(advisory) = advance.next else {
        panic!("expected a rest advisory");
    };
    assert_eq!(advisory.days_remaining, 1);
    assert_eq!(
        advisory.next_eligible,
        NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
    );
    assert_eq!(advisory.plan.day_index, 1);
    assert_eq!(advance.days_completed_in_row, 1);

    let wednesday = monday() + Duration::days(2);
    let advance = scheduler
        .next_day(user_id, MASS_BEGINNER, wednesday)
        .await
        .unwrap();
    assert!(matches!(advance.next, NextDay::Advanced(ref p) if p.day_index == 1));
    assert_eq!(advance.days_completed_in_row, 2);
}

#[tokio::test]
async fn test_second_program_conflicts() {
    let app = common::create_test_app();
    let user_id = 803;
    let scheduler = app.state.scheduler();

    scheduler
        .start_program(user_id, MASS_BEGINNER, monday())
        .await
        .unwrap();
    // Starting the same program again is harmless
    scheduler
        .start_program(user_id, MASS_BEGINNER, monday())
        .await
        .unwrap();

    let result = scheduler
        .start_program(user_id, STRENGTH_BEGINNER, monday())
        .await;
    assert!(matches!(
        result,
        Err(AppError::ConflictActiveProgram {
            active_program_id: MASS_BEGINNER
        })
    ));

    let result = scheduler
        .next_day(user_id, STRENGTH_BEGINNER, monday())
        .await;
    assert!(matches!(result, Err(AppError::ConflictActiveProgram { .. })));

    assert_eq!(
        scheduler.stop_program(user_id, monday()).await.unwrap(),
        Some(MASS_BEGINNER)
    );
    assert_eq!(scheduler.stop_program(user_id, monday()).await.unwrap(), None);
    scheduler
        .start_program(user_id, STRENGTH_BEGINNER, monday())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_program_queue_follows_started_exercises() {
    let app = common::create_test_app();
    let user_id = 804;

    app.state
        .scheduler()
        .next_day(user_id, STRENGTH_BEGINNER, monday())
        .await
        .unwrap();

    let sessions = app.state.sessions();
    let started = sessions
        .start_exercise(user_id, "squat", monday())
        .await
        .unwrap();
    assert_eq!(started.next_in_program.as_deref(), Some("bench_press"));
    assert!(!started.program_day_complete);

    sessions
        .start_exercise(user_id, "bench_press", monday())
        .await
        .unwrap();
    let started = sessions
        .start_exercise(user_id, "barbell_row", monday())
        .await
        .unwrap();
    assert_eq!(started.next_in_program, None);
    assert!(started.program_day_complete);

    // An empty training closes without error and clears the queue
    sessions
        .end_training(user_id, monday() + Duration::hours(1))
        .await
        .unwrap();
    let user = app.state.db.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.session.program_queue, None);
}

#[tokio::test]
async fn test_reminder_fires_only_while_current() {
    let app = common::create_test_app();
    let user_id = 805;

    let advance = app
        .state
        .scheduler()
        .next_day(user_id, MASS_BEGINNER, monday())
        .await
        .unwrap();
    let payload = ProgramReminderPayload {
        user_id,
        program_id: MASS_BEGINNER,
        days_completed_in_row: advance.days_completed_in_row,
    };

    let at = advance.available_at.unwrap();
    assert!(jobs::program_reminder(&app.state, &payload, at).await.unwrap());
    let notes = app.state.db.drain_notifications(user_id).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(
        notes[0].kind,
        NotificationKind::ProgramDayAvailable {
            program_id: MASS_BEGINNER,
            date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        }
    );

    app.state
        .scheduler()
        .stop_program(user_id, at)
        .await
        .unwrap();
    assert!(!jobs::program_reminder(&app.state, &payload, at).await.unwrap());
    assert!(app
        .state
        .db
        .drain_notifications(user_id)
        .await
        .unwrap()
        .is_empty());
}
