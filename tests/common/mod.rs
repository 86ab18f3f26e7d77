// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, Response};
use gym_buddy::config::{tasks_service_account, Config};
use gym_buddy::db::firestore::FirestoreDb;
use gym_buddy::db::memory::MemoryDb;
use gym_buddy::db::Store;
use gym_buddy::middleware::auth::create_jwt;
use gym_buddy::routes::create_router;
use gym_buddy::services::{jobs, CatalogService, GoogleOidcVerifier, TasksService};
use gym_buddy::AppState;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", 5)
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// The catalog shipped in `data/`.
#[allow(dead_code)]
pub fn test_catalog() -> CatalogService {
    CatalogService::load_from_file("data/catalog.json").expect("Failed to load catalog")
}

const TASKS_OIDC_KID: &str = "test-tasks-key";
const TASKS_OIDC_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/tasks_oidc_key.pem");
const TASKS_OIDC_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/tasks_oidc_key.pub.pem");

/// Verifier trusting the fixture key instead of Google's JWKS.
#[allow(dead_code)]
pub fn test_oidc_verifier(config: &Config) -> GoogleOidcVerifier {
    let key = DecodingKey::from_rsa_pem(TASKS_OIDC_PUBLIC_KEY).expect("Invalid fixture key");
    GoogleOidcVerifier::with_static_key(config, TASKS_OIDC_KID, key)
        .expect("Failed to build OIDC verifier")
}

/// State over any store. Its task queue has no worker, so queuing fails.
#[allow(dead_code)]
pub fn test_state(db: Arc<dyn Store>) -> Arc<AppState> {
    let config = Config::test_default();
    let (tasks_service, _rx) = TasksService::in_process();
    Arc::new(AppState {
        oidc_verifier: test_oidc_verifier(&config),
        config,
        db,
        catalog: test_catalog(),
        tasks_service,
    })
}

/// Cloud Tasks style ID token for this service, with `overrides` merged
/// into the default claims.
#[allow(dead_code)]
pub fn tasks_oidc_jwt_with(config: &Config, overrides: Value) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "iss": "https://accounts.google.com",
        "aud": config.service_url,
        "sub": "1234567890",
        "email": tasks_service_account(&config.gcp_project_id),
        "email_verified": true,
        "iat": now,
        "exp": now + 3600,
    });
    if let (Some(claims), Some(overrides)) = (claims.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            claims.insert(key.clone(), value.clone());
        }
    }

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TASKS_OIDC_KID.to_string());
    let key = EncodingKey::from_rsa_pem(TASKS_OIDC_PRIVATE_KEY).expect("Invalid fixture key");
    encode(&header, &claims, &key).expect("Failed to sign task token")
}

#[allow(dead_code)]
pub fn tasks_oidc_jwt(config: &Config) -> String {
    tasks_oidc_jwt_with(config, json!({}))
}

/// Offline app: memory store, bundled catalog, in-process task worker.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub memory: Arc<MemoryDb>,
}

/// Create a test app with offline dependencies. Must be called inside a
/// tokio runtime, which runs the task worker.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let memory = Arc::new(MemoryDb::new());
    let db: Arc<dyn Store> = memory.clone();
    let (tasks_service, rx) = TasksService::in_process();

    let config = Config::test_default();
    let state = Arc::new(AppState {
        oidc_verifier: test_oidc_verifier(&config),
        config,
        db,
        catalog: test_catalog(),
        tasks_service,
    });
    tokio::spawn(jobs::run_worker(state.clone(), rx));

    TestApp {
        router: create_router(state.clone()),
        state,
        memory,
    }
}

/// App whose store is an offline Firestore client; every query fails.
#[allow(dead_code)]
pub fn create_offline_firestore_app() -> (axum::Router, Arc<AppState>) {
    let state = test_state(Arc::new(FirestoreDb::new_mock()));
    (create_router(state.clone()), state)
}

/// `Authorization` header value for a chat user.
#[allow(dead_code)]
pub fn bearer(state: &AppState, user_id: u64) -> String {
    let token = create_jwt(user_id, &state.config.jwt_signing_key).expect("Failed to mint JWT");
    format!("Bearer {}", token)
}

/// POST a command as `user_id`.
#[allow(dead_code)]
pub async fn post_command(app: &TestApp, user_id: u64, command: Value) -> Response<Body> {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/commands")
                .header(header::AUTHORIZATION, bearer(&app.state, user_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(command.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// GET `uri` as `user_id`.
#[allow(dead_code)]
pub async fn get_as(app: &TestApp, user_id: u64, uri: &str) -> Response<Body> {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, bearer(&app.state, user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Collect a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
