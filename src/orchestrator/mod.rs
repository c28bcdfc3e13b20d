//! Backup and restore orchestrators.
//!
//! Both acquire an advisory lock on the backup record before their first
//! step, so at most one in-flight operation mutates a given record's status
//! at a time. Locks expire after a configurable timeout so a crashed run
//! cannot block its record forever.

pub mod backup;
pub mod restore;

pub use backup::BackupOrchestrator;
pub use restore::RestoreOrchestrator;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};
use crate::models::{BackupRecord, RestoreOperation};

/// Fetch a backup record or fail with NotFound
pub async fn get_backup(pool: &SqlitePool, backup_id: i64) -> Result<BackupRecord> {
    sqlx::query_as::<_, BackupRecord>("SELECT * FROM backup_records WHERE id = ?")
        .bind(backup_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Backup"))
}

/// Fetch a restore operation or fail with NotFound
pub async fn get_restore(pool: &SqlitePool, operation_id: i64) -> Result<RestoreOperation> {
    sqlx::query_as::<_, RestoreOperation>("SELECT * FROM restore_operations WHERE id = ?")
        .bind(operation_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Restore operation"))
}

/// Try to take the advisory lock on a backup record.
///
/// Succeeds when the record is unlocked or its lock is older than
/// `timeout_secs`. Fails with `InvalidState` when another operation holds it.
pub async fn acquire_lock(
    pool: &SqlitePool,
    backup_id: i64,
    owner: &str,
    timeout_secs: i64,
) -> Result<()> {
    let now = Utc::now();
    let expired_before = now - Duration::seconds(timeout_secs);

    let updated = sqlx::query(
        "UPDATE backup_records SET locked_by = ?, locked_at = ? \
         WHERE id = ? AND (locked_by IS NULL OR locked_at < ?)",
    )
    .bind(owner)
    .bind(now)
    .bind(backup_id)
    .bind(expired_before)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 1 {
        Ok(())
    } else {
        tracing::warn!("Backup {} is locked; rejecting concurrent operation", backup_id);
        Err(AppError::InvalidState(
            crate::constants::ERR_RECORD_LOCKED.to_string(),
        ))
    }
}

/// Release the advisory lock if still held by `owner`
pub async fn release_lock(pool: &SqlitePool, backup_id: i64, owner: &str) -> Result<()> {
    sqlx::query(
        "UPDATE backup_records SET locked_by = NULL, locked_at = NULL \
         WHERE id = ? AND locked_by = ?",
    )
    .bind(backup_id)
    .bind(owner)
    .execute(pool)
    .await?;
    Ok(())
}
