// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end tests of the command API through the router.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

mod common;
use common::{body_json, get_as, post_command};

#[tokio::test]
async fn test_training_flow() {
    let app = common::create_test_app();
    let user_id = 9001;

    let response = post_command(
        &app,
        user_id,
        json!({"type": "start_exercise", "exercise_id": "bench_press"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let started = body_json(response).await;
    assert_eq!(started["type"], "exercise_started");
    assert_eq!(started["set"]["exercise_id"], "bench_press");
    assert!(started["previous"].is_null());

    for input in ["10 50", "8 50"] {
        let response = post_command(
            &app,
            user_id,
            json!({"type": "record_rep", "input": input}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["type"], "rep_recorded");
    }

    let response = post_command(&app, user_id, json!({"type": "end_training"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["type"], "training_ended");
    assert_eq!(summary["weight_lifted"], 900.0);
    assert_eq!(summary["exercises"], json!(["Bench press"]));

    let me = body_json(get_as(&app, user_id, "/api/me").await).await;
    assert_eq!(me["user_id"], user_id);
    assert!(me["session"]["open_training_id"].is_null());
    assert_eq!(me["session"]["last_exercise_id"], "bench_press");
}

#[tokio::test]
async fn test_typed_errors() {
    let app = common::create_test_app();
    let user_id = 9002;

    let response = post_command(&app, user_id, json!({"type": "end_training"})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "no_active_training");

    post_command(
        &app,
        user_id,
        json!({"type": "start_exercise", "exercise_id": "squat"}),
    )
    .await;

    let response = post_command(
        &app,
        user_id,
        json!({"type": "record_rep", "input": "lots"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "invalid_rep_input");

    let response = post_command(
        &app,
        user_id,
        json!({"type": "edit_last_rep", "input": {"reps": 5, "weight": 80}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "empty_set");

    post_command(&app, user_id, json!({"type": "start_program", "program_id": 1})).await;
    let response = post_command(
        &app,
        user_id,
        json!({"type": "start_program", "program_id": 3}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "conflict_active_program");
    assert_eq!(body["details"], "active program 1");
}

#[tokio::test]
async fn test_malformed_commands_rejected_at_boundary() {
    let app = common::create_test_app();

    let response = post_command(&app, 9003, json!({"type": "teleport"})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = post_command(&app, 9003, json!({"type": "request_report", "period": 6})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/commands")
                .header(header::AUTHORIZATION, common::bearer(&app.state, 9003))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_program_day_then_rest() {
    let app = common::create_test_app();
    let user_id = 9004;

    let response = post_command(
        &app,
        user_id,
        json!({"type": "next_program_day", "program_id": 3, "timestamp": 1772442000}),
    )
    .await;
    let plan = body_json(response).await;
    assert_eq!(plan["type"], "day_plan");
    assert_eq!(plan["plan"]["day_index"], 0);
    assert_eq!(plan["days_completed_in_row"], 1);

    let response = post_command(
        &app,
        user_id,
        json!({"type": "next_program_day", "program_id": 3, "timestamp": 1772528400}),
    )
    .await;
    let rest = body_json(response).await;
    assert_eq!(rest["type"], "rest_advisory");
    assert_eq!(rest["days_remaining"], 2);
    assert_eq!(rest["plan"]["day_index"], 1);

    let response = post_command(&app, user_id, json!({"type": "stop_program"})).await;
    assert_eq!(
        body_json(response).await,
        json!({"type": "program_stopped", "program_id": 3})
    );
}

#[tokio::test]
async fn test_report_is_built_in_background() {
    let app = common::create_test_app();
    let user_id = 9005;

    post_command(
        &app,
        user_id,
        json!({"type": "start_exercise", "exercise_id": "bench_press"}),
    )
    .await;
    post_command(&app, user_id, json!({"type": "record_rep", "input": "10 50"})).await;
    post_command(&app, user_id, json!({"type": "end_training"})).await;

    let response = post_command(&app, user_id, json!({"type": "request_report", "period": 1})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let queued = body_json(response).await;
    assert_eq!(queued["type"], "report_queued");
    let job_id = queued["job_id"].as_str().unwrap().to_string();
    let uri = format!("/api/reports/{}", job_id);

    let mut job = Value::Null;
    for _ in 0..100 {
        job = body_json(get_as(&app, user_id, &uri).await).await;
        if job["status"] != "pending" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(job["status"], "completed");
    assert_eq!(job["report"]["series"]["Chest"]["Bench press"][0]["score"], 5000);
    assert_eq!(job["report"]["max_scores"]["Bench press"], 5000);
    assert_eq!(job["report"]["summary"]["total_trainings"], 1);

    let notes = body_json(get_as(&app, user_id, "/api/notifications").await).await;
    assert_eq!(notes.as_array().unwrap().len(), 1);
    assert_eq!(notes[0]["kind"], "report_ready");
    assert_eq!(notes[0]["job_id"], job_id.as_str());

    // Drained
    let notes = body_json(get_as(&app, user_id, "/api/notifications").await).await;
    assert!(notes.as_array().unwrap().is_empty());

    // Someone else's job looks like no job at all
    let response = get_as(&app, user_id + 1, &uri).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_and_programs() {
    let app = common::create_test_app();
    let user_id = 9006;

    let response = post_command(
        &app,
        user_id,
        json!({"type": "update_settings", "body_weight_kg": 81.5, "silent": true}),
    )
    .await;
    let updated = body_json(response).await;
    assert_eq!(updated["type"], "settings_updated");
    assert_eq!(updated["body_weight_kg"], 81.5);
    assert_eq!(updated["session"]["silent"], true);

    let response = post_command(
        &app,
        user_id,
        json!({"type": "update_settings", "body_weight_kg": 1.0}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let programs = body_json(get_as(&app, user_id, "/api/programs?group=strength&level=beginner").await).await;
    assert_eq!(programs.as_array().unwrap().len(), 1);
    assert_eq!(programs[0]["id"], 3);

    let programs = body_json(get_as(&app, user_id, "/api/programs?group=mass").await).await;
    assert_eq!(programs.as_array().unwrap().len(), 2);

    let response = get_as(&app, user_id, "/api/programs?group=mass&level=expert").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_failure_is_generic_500() {
    let (app, state) = common::create_offline_firestore_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/commands")
                .header(header::AUTHORIZATION, common::bearer(&state, 9007))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"type": "end_training"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body, json!({"error": "database_error"}));
}

#[tokio::test]
async fn test_training_history_newest_first() {
    let app = common::create_test_app();
    let user_id = 9008;

    for (exercise, input) in [("bench_press", "10 50"), ("squat", "5 100")] {
        post_command(
            &app,
            user_id,
            json!({"type": "start_exercise", "exercise_id": exercise}),
        )
        .await;
        post_command(&app, user_id, json!({"type": "record_rep", "input": input})).await;
        let response = post_command(&app, user_id, json!({"type": "end_training"})).await;
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let history = body_json(get_as(&app, user_id, "/api/trainings").await).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0]["sets"],
        json!([{"exercise_id": "squat", "group": "Legs", "tool": "Barbell", "exercise": "Squat"}])
    );
    assert_eq!(history[1]["sets"][0]["exercise"], "Bench press");
    assert!(!history[0]["end"].is_null());

    let latest = body_json(get_as(&app, user_id, "/api/trainings?limit=1").await).await;
    assert_eq!(latest.as_array().unwrap().len(), 1);
    assert_eq!(latest[0]["training_id"], history[0]["training_id"]);

    for uri in ["/api/trainings?limit=0", "/api/trainings?limit=51"] {
        let response = get_as(&app, user_id, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }

    // Someone else's history is their own
    let other = body_json(get_as(&app, user_id + 1, "/api/trainings").await).await;
    assert_eq!(other, json!([]));
}

#[tokio::test]
async fn test_calculator_needs_profile_first() {
    let app = common::create_test_app();
    let user_id = 9009;

    let response = post_command(
        &app,
        user_id,
        json!({"type": "calculate", "input": "20 185 75"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_command(
        &app,
        user_id,
        json!({"type": "calculator_profile", "gender": "male", "activity_level": "moderate"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = body_json(response).await;
    assert_eq!(saved["type"], "calculator_profile_saved");
    assert_eq!(saved["activity_level"], "moderate");

    let response = post_command(
        &app,
        user_id,
        json!({"type": "calculate", "input": "20 185 75"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["type"], "calculation");
    assert_eq!(result["bmi"], 21.9);
    assert_eq!(result["rating"], "good");
    assert_eq!(result["daily_kcal"], 2807.4);
    assert_eq!(result["deficit"][0]["kcal"], 2667);
    assert_eq!(result["surplus"].as_array().unwrap().len(), 4);

    // The profile is used up by a calculation
    let response = post_command(
        &app,
        user_id,
        json!({"type": "calculate", "input": "20 185 75"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    post_command(
        &app,
        user_id,
        json!({"type": "calculator_profile", "gender": "male", "activity_level": "moderate"}),
    )
    .await;
    let response = post_command(
        &app,
        user_id,
        json!({"type": "calculate", "input": {"age": 20, "height_cm": 185, "weight_kg": 75}}),
    )
    .await;
    assert_eq!(body_json(response).await["daily_kcal"], 2807.4);

    let response = post_command(
        &app,
        user_id,
        json!({"type": "calculate", "input": "20 185 5"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
