// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod calculator;
pub mod catalog;
pub mod google_oidc;
pub mod jobs;
pub mod program;
pub mod score;
pub mod session;
pub mod tasks;

pub use catalog::{CatalogError, CatalogService};
pub use google_oidc::GoogleOidcVerifier;
pub use program::{ProgramScheduler, RestPolicy};
pub use session::{RepInput, SessionController};
pub use tasks::TasksService;
