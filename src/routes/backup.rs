use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::JobMode;
use crate::error::{AppError, Result};
use crate::jobs;
use crate::models::{BackupOptions, BackupRecord, BackupStatus, DataModule};
use crate::orchestrator;
use crate::routes::actor_from_headers;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    pub backup_name: Option<String>,
    pub modules: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateBackupResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<i64>,
}

/// Backup record as exposed over the API
#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub backup_type: String,
    pub format: String,
    pub modules: Vec<String>,
    pub status: String,
    pub storage_location: String,
    pub remote_file_id: Option<String>,
    pub remote_link: Option<String>,
    pub encrypted: bool,
    pub compressed: bool,
    pub verified: bool,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BackupRecord> for BackupResponse {
    fn from(record: BackupRecord) -> Self {
        let modules = record
            .module_list()
            .map(|list| list.iter().map(|m| m.tag().to_string()).collect())
            .unwrap_or_default();
        Self {
            id: record.id,
            name: record.name,
            backup_type: record.backup_type.as_str().to_string(),
            format: record.format,
            modules,
            status: record.status.as_str().to_string(),
            storage_location: record.storage_location,
            remote_file_id: record.remote_file_id,
            remote_link: record.remote_link,
            encrypted: record.encrypted,
            compressed: record.compressed,
            verified: record.verified,
            file_size: record.file_size,
            error_message: record.error_message,
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Create a backup
///
/// Validates the module selection, persists a `pending` record, and hands the
/// work to the job layer. In background mode the client polls the progress
/// endpoint; in inline mode the response reports the terminal outcome.
pub async fn create_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBackupRequest>,
) -> Result<(StatusCode, Json<CreateBackupResponse>)> {
    // 1. Validate the module selection
    if payload.modules.is_empty() {
        return Err(AppError::Validation(
            crate::constants::ERR_NO_MODULES.to_string(),
        ));
    }
    let mut modules = Vec::with_capacity(payload.modules.len());
    for tag in &payload.modules {
        modules.push(DataModule::parse(tag)?);
    }

    // 2. Parse options
    let options = BackupOptions::parse(&payload.options)?;

    // 3. Persist the pending record
    let actor = actor_from_headers(&headers);
    let record = state
        .backup_orchestrator()
        .create(&modules, options, payload.backup_name.clone(), &actor)
        .await?;

    // 4. Dispatch the work
    jobs::dispatch_backup(&state, record.id, options.verify).await?;

    match state.config.job_mode {
        JobMode::Background => Ok((
            StatusCode::ACCEPTED,
            Json(CreateBackupResponse {
                success: true,
                message: format!("Backup '{}' started", record.name),
                backup_id: Some(record.id),
            }),
        )),
        JobMode::Inline => {
            let finished = orchestrator::get_backup(&state.pool, record.id).await?;
            let (success, message) = match finished.status {
                BackupStatus::Completed => {
                    (true, format!("Backup '{}' completed successfully", finished.name))
                }
                _ => (
                    false,
                    finished
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Backup failed".to_string()),
                ),
            };
            Ok((
                StatusCode::OK,
                Json(CreateBackupResponse {
                    success,
                    message,
                    backup_id: Some(finished.id),
                }),
            ))
        }
    }
}

/// List backup history, newest first. Failed backups stay visible with their
/// error messages.
pub async fn list_backups(State(state): State<AppState>) -> Result<Json<Vec<BackupResponse>>> {
    let records = sqlx::query_as::<_, BackupRecord>(
        "SELECT * FROM backup_records ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(records.into_iter().map(BackupResponse::from).collect()))
}

/// Fetch a single backup record
pub async fn get_backup(
    State(state): State<AppState>,
    Path(backup_id): Path<i64>,
) -> Result<Json<BackupResponse>> {
    let record = orchestrator::get_backup(&state.pool, backup_id).await?;
    Ok(Json(record.into()))
}

#[derive(Debug, Serialize)]
pub struct DeleteBackupResponse {
    pub success: bool,
    pub message: String,
}

/// Delete a backup and its remote artifact
pub async fn delete_backup(
    State(state): State<AppState>,
    Path(backup_id): Path<i64>,
) -> Result<Json<DeleteBackupResponse>> {
    state.backup_orchestrator().delete(backup_id).await?;
    Ok(Json(DeleteBackupResponse {
        success: true,
        message: "Backup deleted".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EstimateParams {
    /// Comma-separated module tags
    pub modules: String,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub estimated_mb: f64,
}

/// Advisory size estimate for a module selection
pub async fn estimate_backup_size(
    State(state): State<AppState>,
    Query(params): Query<EstimateParams>,
) -> Result<Json<EstimateResponse>> {
    let modules = DataModule::parse_list(&params.modules)?;
    let estimated_mb = state.backup_orchestrator().estimate_size(&modules).await?;
    Ok(Json(EstimateResponse { estimated_mb }))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Recheck a stored artifact against its recorded checksum
pub async fn verify_backup(
    State(state): State<AppState>,
    Path(backup_id): Path<i64>,
) -> Result<Json<VerifyResponse>> {
    let record = orchestrator::get_backup(&state.pool, backup_id).await?;
    let outcome = state
        .backup_orchestrator()
        .verify_integrity(&record)
        .await?;
    Ok(Json(VerifyResponse {
        valid: outcome.valid,
        error: outcome.error,
    }))
}
