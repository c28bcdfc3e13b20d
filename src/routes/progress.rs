use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::Result;
use crate::models::BackupStatus;
use crate::orchestrator;
use crate::AppState;

/// Progress poll payload, shared by backups and restores
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub status: String,
    pub progress: i64,
    pub message: String,
    pub error: Option<String>,
}

/// Poll a backup's progress by backup id
pub async fn backup_progress(
    State(state): State<AppState>,
    Path(backup_id): Path<i64>,
) -> Result<Json<ProgressResponse>> {
    let record = orchestrator::get_backup(&state.pool, backup_id).await?;

    let message = match record.status {
        BackupStatus::Pending => "Backup queued".to_string(),
        BackupStatus::InProgress => "Backup in progress".to_string(),
        BackupStatus::Completed => format!("Backup '{}' completed successfully", record.name),
        BackupStatus::Failed => "Backup failed".to_string(),
    };

    Ok(Json(ProgressResponse {
        status: record.status.as_str().to_string(),
        progress: record.status.progress_percent(),
        message,
        error: record.error_message,
    }))
}

/// Poll a restore's progress by restore-operation id
pub async fn restore_progress(
    State(state): State<AppState>,
    Path(operation_id): Path<i64>,
) -> Result<Json<ProgressResponse>> {
    let operation = orchestrator::get_restore(&state.pool, operation_id).await?;

    Ok(Json(ProgressResponse {
        status: operation.status.as_str().to_string(),
        progress: operation.progress,
        message: operation.current_step,
        error: operation.error_message,
    }))
}
