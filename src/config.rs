// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. Enumerated settings are parsed
//! strictly so a typo fails the deploy instead of silently falling back.

use std::env;
use std::str::FromStr;

/// Cloud Tasks queue that carries report and reminder jobs.
pub const JOB_QUEUE_NAME: &str = "gym-buddy-jobs";

/// Service account that Cloud Tasks signs callback tokens as.
pub fn tasks_service_account(project_id: &str) -> String {
    format!("gym-buddy-api@{}.iam.gserviceaccount.com", project_id)
}

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store for development and tests.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Which background job queue to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TasksBackend {
    /// Google Cloud Tasks calling back into `/tasks/*`.
    Cloud,
    /// A tokio worker inside this process.
    InProcess,
}

impl FromStr for TasksBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "in_process" | "in-process" => Ok(Self::InProcess),
            _ => Err(ConfigError::Invalid("TASKS_BACKEND", s.to_string())),
        }
    }
}

/// How the rest interval between program days is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestIntervalMode {
    /// Difference between calendar dates in the configured offset.
    /// A day trained at 23:50 followed by one at 00:10 counts as one day.
    #[default]
    CalendarDays,
    /// Whole 24h periods elapsed since the last advance (partial days round down).
    ElapsedDays,
}

impl FromStr for RestIntervalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calendar_days" | "calendar" => Ok(Self::CalendarDays),
            "elapsed_days" | "elapsed" => Ok(Self::ElapsedDays),
            _ => Err(ConfigError::Invalid("REST_INTERVAL_MODE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region hosting the task queue
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// Public base URL of this service (Cloud Tasks callback target)
    pub service_url: String,
    /// HS256 key shared with the chat front-end (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    pub store_backend: StoreBackend,
    pub tasks_backend: TasksBackend,
    /// Path to the exercise/program catalog
    pub catalog_path: String,
    pub rest_interval_mode: RestIntervalMode,
    /// Offset from UTC that defines a user's calendar day
    pub utc_offset_minutes: i32,
    /// Score fallback when a user never recorded a body weight
    pub default_body_weight_kg: f64,
    /// Attempts for a contended store transaction before giving up
    pub store_tx_max_attempts: u32,
    /// Trainings listed in the history when the client gives no limit
    pub last_trainings_num: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-central1".to_string()),
            port,
            service_url: env::var("SERVICE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            store_backend: parse_or("STORE_BACKEND", StoreBackend::Firestore)?,
            tasks_backend: parse_or("TASKS_BACKEND", TasksBackend::Cloud)?,
            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "data/catalog.json".to_string()),
            rest_interval_mode: parse_or("REST_INTERVAL_MODE", RestIntervalMode::CalendarDays)?,
            utc_offset_minutes: parse_or("UTC_OFFSET_MINUTES", 0)?,
            default_body_weight_kg: parse_or("DEFAULT_BODY_WEIGHT_KG", 10.0)?,
            store_tx_max_attempts: parse_or("STORE_TX_MAX_ATTEMPTS", 5u32)?.max(1),
            last_trainings_num: parse_or("LAST_TRAININGS_NUM", 5usize)?,
        })
    }

    /// Offline configuration for tests: memory store, in-process jobs.
    pub fn test_default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-central1".to_string(),
            port: 8080,
            service_url: "http://localhost:8080".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            store_backend: StoreBackend::Memory,
            tasks_backend: TasksBackend::InProcess,
            catalog_path: "data/catalog.json".to_string(),
            rest_interval_mode: RestIntervalMode::CalendarDays,
            utc_offset_minutes: 0,
            default_body_weight_kg: 10.0,
            store_tx_max_attempts: 5,
            last_trainings_num: 5,
        }
    }
}

/// Read `name` and parse it, or use `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("REST_INTERVAL_MODE", "elapsed_days");
        env::set_var("STORE_BACKEND", "memory");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.jwt_signing_key, b"test_jwt_key_32_bytes_minimum!!");
        assert_eq!(config.rest_interval_mode, RestIntervalMode::ElapsedDays);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.port, 8080);

        env::remove_var("REST_INTERVAL_MODE");
        env::remove_var("STORE_BACKEND");
    }

    #[test]
    fn enumerated_settings_reject_typos() {
        assert!("firestor".parse::<StoreBackend>().is_err());
        assert!("cloudy".parse::<TasksBackend>().is_err());
        assert_eq!(
            "Calendar_Days".parse::<RestIntervalMode>().unwrap(),
            RestIntervalMode::CalendarDays
        );
        assert_eq!(
            "in-process".parse::<TasksBackend>().unwrap(),
            TasksBackend::InProcess
        );
    }
}
