// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Gym-Buddy: workout sessions and program progression for a gym chat bot
//!
//! This crate provides the backend the chat front-end talks to: it records
//! trainings, sets and reps, walks users through multi-day programs and
//! builds score reports in the background.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{
    CatalogService, GoogleOidcVerifier, ProgramScheduler, RestPolicy, SessionController,
    TasksService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub catalog: CatalogService,
    pub tasks_service: TasksService,
    /// Checks the OIDC token on `/tasks/*` callbacks
    pub oidc_verifier: GoogleOidcVerifier,
}

impl AppState {
    pub fn sessions(&self) -> SessionController<'_> {
        SessionController::new(self.db.as_ref(), &self.catalog)
    }

    pub fn scheduler(&self) -> ProgramScheduler<'_> {
        ProgramScheduler::new(self.db.as_ref(), &self.catalog, self.rest_policy())
    }

    pub fn rest_policy(&self) -> RestPolicy {
        RestPolicy {
            mode: self.config.rest_interval_mode,
            utc_offset_minutes: self.config.utc_offset_minutes,
        }
    }
}
