//! Background execution of orchestrator work.
//!
//! Jobs are keyed by the restore-operation id (one backup may be restored
//! many times) or the backup id. In `Background` mode the work runs on a
//! spawned task and clients poll the progress endpoints; `Inline` mode runs
//! the work before responding and is meant for small deployments and tests.
//!
//! A job's failure handler distinguishes infrastructure failures of the job
//! machinery itself (panic, inability to persist state) from restore/backup
//! logic failures, which the orchestrators already record on their rows.

use chrono::Utc;

use crate::config::JobMode;
use crate::error::Result;
use crate::AppState;

/// Run a pending backup, either inline or on a background task
pub async fn dispatch_backup(state: &AppState, backup_id: i64, verify: bool) -> Result<()> {
    match state.config.job_mode {
        JobMode::Inline => state.backup_orchestrator().run(backup_id, verify).await,
        JobMode::Background => {
            let state = state.clone();
            tokio::spawn(async move {
                let worker = {
                    let state = state.clone();
                    tokio::spawn(async move {
                        state.backup_orchestrator().run(backup_id, verify).await
                    })
                };
                match worker.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        fail_backup(&state, backup_id, &format!("Backup failed: {}", e)).await;
                    }
                    Err(join_error) => {
                        fail_backup(
                            &state,
                            backup_id,
                            &format!("Backup job infrastructure failure: {}", join_error),
                        )
                        .await;
                    }
                }
            });
            Ok(())
        }
    }
}

/// Run a pending restore operation, either inline or on a background task
pub async fn dispatch_restore(state: &AppState, operation_id: i64) -> Result<()> {
    match state.config.job_mode {
        JobMode::Inline => state.restore_orchestrator().run(operation_id).await,
        JobMode::Background => {
            let state = state.clone();
            tokio::spawn(async move {
                let worker = {
                    let state = state.clone();
                    tokio::spawn(
                        async move { state.restore_orchestrator().run(operation_id).await },
                    )
                };
                match worker.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        fail_restore(&state, operation_id, &format!("Restore failed: {}", e)).await;
                    }
                    Err(join_error) => {
                        fail_restore(
                            &state,
                            operation_id,
                            &format!("Restore job infrastructure failure: {}", join_error),
                        )
                        .await;
                    }
                }
            });
            Ok(())
        }
    }
}

/// Best-effort terminal failure for a backup the job layer lost track of
async fn fail_backup(state: &AppState, backup_id: i64, message: &str) {
    tracing::error!("Backup job {} failed terminally: {}", backup_id, message);
    let result = sqlx::query(
        "UPDATE backup_records \
         SET status = 'failed', error_message = ?, locked_by = NULL, locked_at = NULL, \
             updated_at = ? \
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(message)
    .bind(Utc::now())
    .bind(backup_id)
    .execute(&state.pool)
    .await;
    if let Err(e) = result {
        tracing::error!("Could not record backup job failure: {}", e);
    }
}

/// Best-effort terminal failure for a restore the job layer lost track of
async fn fail_restore(state: &AppState, operation_id: i64, message: &str) {
    tracing::error!(
        "Restore job {} failed terminally: {}",
        operation_id,
        message
    );
    let result = sqlx::query(
        "UPDATE restore_operations \
         SET status = 'failed', progress = 0, error_message = ?, completed_at = ? \
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(message)
    .bind(Utc::now())
    .bind(operation_id)
    .execute(&state.pool)
    .await;
    if let Err(e) = result {
        tracing::error!("Could not record restore job failure: {}", e);
    }
}
