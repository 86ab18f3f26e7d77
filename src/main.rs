// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gym-Buddy API Server
//!
//! Backend for the gym chat bot: training sessions, program progression
//! and score reports.

use gym_buddy::{
    config::{Config, StoreBackend, TasksBackend},
    db::{firestore::FirestoreDb, memory::MemoryDb, Store},
    services::{jobs, CatalogService, GoogleOidcVerifier, TasksService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Gym-Buddy API");

    let db: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id, config.store_tx_max_attempts).await?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    // Load exercise and program catalog
    tracing::info!(path = %config.catalog_path, "Loading catalog");
    let catalog = CatalogService::load_from_file(&config.catalog_path)?;

    let (tasks_service, worker_rx) = match config.tasks_backend {
        TasksBackend::Cloud => {
            tracing::info!(project = %config.gcp_project_id, "Cloud Tasks service initialized");
            (
                TasksService::new(&config.gcp_project_id, &config.gcp_region),
                None,
            )
        }
        TasksBackend::InProcess => {
            let (service, rx) = TasksService::in_process();
            (service, Some(rx))
        }
    };

    let oidc_verifier = GoogleOidcVerifier::new(&config)?;

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        catalog,
        tasks_service,
        oidc_verifier,
    });

    if let Some(rx) = worker_rx {
        tokio::spawn(jobs::run_worker(state.clone(), rx));
    }

    // Build router
    let app = gym_buddy::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), tracing_subscriber::filter::ParseError> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gym_buddy=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
