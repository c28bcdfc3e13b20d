use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::JobMode;
use crate::error::{AppError, Result};
use crate::jobs;
use crate::models::{RestoreFlags, RestoreOperation, RestoreStatus};
use crate::orchestrator::{self, restore::restore_message};
use crate::routes::actor_from_headers;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub backup_id: i64,
    #[serde(default)]
    pub restore_options: Vec<String>,
    /// Must be literal `true`; restores are destructive
    #[serde(default)]
    pub confirm_restore: bool,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<i64>,
}

/// Restore operation as exposed over the API
#[derive(Debug, Serialize)]
pub struct RestoreOperationResponse {
    pub id: i64,
    pub backup_id: i64,
    pub backup_name: String,
    pub modules_restored: Vec<String>,
    pub status: String,
    pub progress: i64,
    pub current_step: String,
    pub restore_options: Vec<String>,
    pub error_message: Option<String>,
    pub restored_by: String,
    pub restored_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<RestoreOperation> for RestoreOperationResponse {
    fn from(operation: RestoreOperation) -> Self {
        let modules_restored = operation
            .module_list()
            .map(|list| list.iter().map(|m| m.tag().to_string()).collect())
            .unwrap_or_default();
        let restore_options = operation
            .restore_options
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            id: operation.id,
            backup_id: operation.backup_id,
            backup_name: operation.backup_name,
            modules_restored,
            status: operation.status.as_str().to_string(),
            progress: operation.progress,
            current_step: operation.current_step,
            restore_options,
            error_message: operation.error_message,
            restored_by: operation.restored_by,
            restored_at: operation.restored_at,
            completed_at: operation.completed_at,
        }
    }
}

/// Request a restore from a completed backup
///
/// Preconditions (checked before any side effect): explicit confirmation,
/// the backup exists and is `completed`, and no concurrent operation holds
/// its lock.
pub async fn request_restore(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RestoreRequest>,
) -> Result<(StatusCode, Json<RestoreResponse>)> {
    // 1. Restores are destructive; require explicit confirmation
    if !payload.confirm_restore {
        return Err(AppError::Validation(
            crate::constants::ERR_CONFIRM_REQUIRED.to_string(),
        ));
    }

    // 2. Parse options
    let flags = RestoreFlags::parse(&payload.restore_options)?;

    // 3. Validate preconditions and create the operation
    let actor = actor_from_headers(&headers);
    let operation = state
        .restore_orchestrator()
        .request(payload.backup_id, flags, &actor)
        .await?;

    // 4. Dispatch the work
    jobs::dispatch_restore(&state, operation.id).await?;

    match state.config.job_mode {
        JobMode::Background => Ok((
            StatusCode::ACCEPTED,
            Json(RestoreResponse {
                success: true,
                message: format!("Restore of '{}' started", operation.backup_name),
                operation_id: Some(operation.id),
            }),
        )),
        JobMode::Inline => {
            let finished = orchestrator::get_restore(&state.pool, operation.id).await?;
            let (success, message) = match finished.status {
                RestoreStatus::Completed => {
                    let backup =
                        orchestrator::get_backup(&state.pool, finished.backup_id).await?;
                    let modules = finished.module_list()?;
                    (true, restore_message(&backup, &modules))
                }
                _ => (
                    false,
                    finished
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Restore failed".to_string()),
                ),
            };
            Ok((
                StatusCode::OK,
                Json(RestoreResponse {
                    success,
                    message,
                    operation_id: Some(finished.id),
                }),
            ))
        }
    }
}

/// List restore history, newest first
pub async fn list_restores(
    State(state): State<AppState>,
) -> Result<Json<Vec<RestoreOperationResponse>>> {
    let operations = sqlx::query_as::<_, RestoreOperation>(
        "SELECT * FROM restore_operations ORDER BY restored_at DESC, id DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        operations
            .into_iter()
            .map(RestoreOperationResponse::from)
            .collect(),
    ))
}
