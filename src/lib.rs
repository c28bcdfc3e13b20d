//! Healthrec Backup Server Library
//!
//! Cloud backup/restore subsystem for a barangay health record-keeping
//! application: SQL dumps scoped by data module, optional compression and
//! encryption, remote artifact storage, integrity verification, and
//! selective restore with background progress tracking.

pub mod archive;
pub mod config;
pub mod constants;
pub mod db;
pub mod dump;
pub mod error;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod storage;

pub use config::Config;
pub use error::{AppError, Result};

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;

use orchestrator::{BackupOrchestrator, RestoreOrchestrator};
use storage::RemoteStorage;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub storage: Arc<dyn RemoteStorage>,
}

impl AppState {
    /// Create a new AppState with the given pool, configuration, and storage
    pub fn new(pool: SqlitePool, config: Config, storage: Arc<dyn RemoteStorage>) -> Self {
        Self {
            pool,
            config,
            storage,
        }
    }

    pub fn backup_orchestrator(&self) -> BackupOrchestrator {
        BackupOrchestrator::new(self.pool.clone(), self.storage.clone(), self.config.clone())
    }

    pub fn restore_orchestrator(&self) -> RestoreOrchestrator {
        RestoreOrchestrator::new(self.pool.clone(), self.storage.clone(), self.config.clone())
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route(
            "/api/backups",
            post(routes::create_backup).get(routes::list_backups),
        )
        .route("/api/backups/estimate", get(routes::estimate_backup_size))
        .route(
            "/api/backups/:id",
            get(routes::get_backup).delete(routes::delete_backup),
        )
        .route("/api/backups/:id/progress", get(routes::backup_progress))
        .route("/api/backups/:id/verify", get(routes::verify_backup))
        .route(
            "/api/restores",
            post(routes::request_restore).get(routes::list_restores),
        )
        .route("/api/restores/:id/progress", get(routes::restore_progress))
        .route("/api/storage", get(routes::storage_status))
        .with_state(state)
}
