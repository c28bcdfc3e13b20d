//! Restore orchestrator: download -> verify -> selectively apply -> record.
//!
//! The target backup record is read-only for the whole attempt; every
//! restore-side mutation lands on the restore_operations row.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::archive;
use crate::config::Config;
use crate::constants::*;
use crate::dump;
use crate::error::{AppError, Result};
use crate::models::{
    BackupOptions, BackupRecord, BackupStatus, BackupType, DataModule, RestoreFlags,
    RestoreOperation,
};
use crate::orchestrator::{acquire_lock, get_backup, get_restore, release_lock, BackupOrchestrator};
use crate::storage::RemoteStorage;

#[derive(Clone)]
pub struct RestoreOrchestrator {
    pool: SqlitePool,
    storage: Arc<dyn RemoteStorage>,
    config: Config,
}

impl RestoreOrchestrator {
    pub fn new(pool: SqlitePool, storage: Arc<dyn RemoteStorage>, config: Config) -> Self {
        Self {
            pool,
            storage,
            config,
        }
    }

    fn backup_orchestrator(&self) -> BackupOrchestrator {
        BackupOrchestrator::new(self.pool.clone(), self.storage.clone(), self.config.clone())
    }

    /// Validate preconditions and persist a new `pending` restore operation.
    ///
    /// Precondition violations are raised here, before any state mutation:
    /// the backup must exist, be `completed`, and not be locked by a
    /// concurrent operation.
    pub async fn request(
        &self,
        backup_id: i64,
        flags: RestoreFlags,
        actor: &str,
    ) -> Result<RestoreOperation> {
        let backup = get_backup(&self.pool, backup_id).await?;

        if backup.status != BackupStatus::Completed {
            return Err(AppError::InvalidState(ERR_INCOMPLETE_BACKUP.to_string()));
        }

        let now = Utc::now();
        let operation_id = sqlx::query(
            "INSERT INTO restore_operations \
             (backup_id, backup_name, modules_restored, status, progress, current_step, \
              restore_options, restored_by, restored_at) \
             VALUES (?, ?, ?, 'pending', 0, '', ?, ?, ?)",
        )
        .bind(backup_id)
        .bind(&backup.name)
        .bind(&backup.modules)
        .bind(flags.join())
        .bind(actor)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        // Take the advisory lock up front; on contention the fresh operation
        // row is removed again so the rejected request leaves no side effects.
        let owner = lock_owner(operation_id);
        if let Err(e) = acquire_lock(
            &self.pool,
            backup_id,
            &owner,
            self.config.lock_timeout_secs,
        )
        .await
        {
            sqlx::query("DELETE FROM restore_operations WHERE id = ?")
                .bind(operation_id)
                .execute(&self.pool)
                .await?;
            return Err(e);
        }

        tracing::info!(
            "Restore operation {} created for backup {} ({}) by {}",
            operation_id,
            backup_id,
            backup.name,
            actor
        );

        get_restore(&self.pool, operation_id).await
    }

    /// Execute a pending restore operation to its terminal state.
    ///
    /// Every failure is recorded on the operation (status `failed`,
    /// progress 0, error message); Err is returned only when the terminal
    /// state itself could not be persisted.
    pub async fn run(&self, operation_id: i64) -> Result<()> {
        let operation = get_restore(&self.pool, operation_id).await?;
        let owner = lock_owner(operation_id);

        let outcome = self.execute(&operation).await;

        let result = match outcome {
            Ok(message) => {
                tracing::info!("Restore {} completed: {}", operation_id, message);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Restore {} failed: {}", operation_id, e);
                self.mark_failed(operation_id, &e.to_string()).await
            }
        };

        release_lock(&self.pool, operation.backup_id, &owner).await?;
        result
    }

    /// The named step sequence (progress values are monotonic)
    async fn execute(&self, operation: &RestoreOperation) -> Result<String> {
        let flags = operation.flags()?;
        let backup = get_backup(&self.pool, operation.backup_id).await?;

        // Step 1: starting
        self.start(operation.id).await?;
        self.update_progress(operation.id, PROGRESS_STARTING, STEP_STARTING)
            .await?;

        // Step 2: optional pre-restore safety backup (full, sealed, verified)
        let backup = if flags.create_backup {
            self.update_progress(operation.id, PROGRESS_PRE_RESTORE_BACKUP, STEP_PRE_RESTORE_BACKUP)
                .await?;
            self.create_pre_restore_backup(&operation.restored_by).await?;
            // The target backup row may only be read, never mutated here
            get_backup(&self.pool, operation.backup_id).await?
        } else {
            backup
        };

        // Step 3: optional integrity gate; a mismatch aborts before any data
        // is touched
        if flags.verify_integrity {
            self.update_progress(operation.id, PROGRESS_VERIFYING, STEP_VERIFYING)
                .await?;
            let outcome = self.backup_orchestrator().verify_integrity(&backup).await?;
            if !outcome.valid {
                return Err(AppError::Integrity(
                    outcome
                        .error
                        .unwrap_or_else(|| "Backup artifact failed verification".to_string()),
                ));
            }
        }

        // Step 4: download, unseal, selectively apply
        self.update_progress(operation.id, PROGRESS_RESTORING, STEP_RESTORING)
            .await?;
        let applied_modules = self.apply_backup(&backup, &flags).await?;

        // Step 5: terminal success
        self.complete(operation.id).await?;

        Ok(restore_message(&backup, &applied_modules))
    }

    /// Full backup of every module, compressed + encrypted + verified,
    /// awaited inline. Failure aborts the surrounding restore.
    async fn create_pre_restore_backup(&self, actor: &str) -> Result<BackupRecord> {
        let orchestrator = self.backup_orchestrator();
        let options = BackupOptions {
            compress: true,
            encrypt: true,
            verify: true,
        };
        let record = orchestrator
            .create(&DataModule::ALL, options, None, actor)
            .await?;
        orchestrator.run(record.id, options.verify).await?;

        let finished = get_backup(&self.pool, record.id).await?;
        if finished.status != BackupStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Pre-restore backup failed: {}",
                finished
                    .error_message
                    .unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        Ok(finished)
    }

    /// Download the artifact, reverse its transforms, and apply the SQL,
    /// filtered to the backup's module tables so data belonging to
    /// non-selected modules is left untouched.
    async fn apply_backup(
        &self,
        backup: &BackupRecord,
        flags: &RestoreFlags,
    ) -> Result<Vec<DataModule>> {
        let file_id = backup
            .remote_file_id
            .as_deref()
            .ok_or_else(|| AppError::InvalidState("Backup has no stored artifact".to_string()))?;

        tokio::fs::create_dir_all(&self.config.staging_dir).await?;
        let staged = tempfile::NamedTempFile::new_in(&self.config.staging_dir)?;
        self.storage.download_file(file_id, staged.path()).await?;
        let artifact = tokio::fs::read(staged.path()).await?;

        let key = if backup.encrypted {
            Some(self.config.encryption_key.ok_or_else(|| {
                AppError::Validation(
                    "Backup is encrypted but no encryption key is configured".to_string(),
                )
            })?)
        } else {
            None
        };
        let compressed = backup.compressed;
        let sql_bytes = tokio::task::spawn_blocking(move || {
            archive::open(artifact, compressed, key.as_ref())
        })
        .await??;
        let sql = String::from_utf8(sql_bytes)
            .map_err(|_| AppError::Archive("artifact is not valid UTF-8 SQL".to_string()))?;

        let modules = backup.module_list()?;

        // Selective backups are always filtered; full backups only when the
        // caller asked for a selective restore
        let filter = backup.backup_type == BackupType::Selective || flags.selective_restore;
        let stats = if filter {
            let allowed = DataModule::tables_for(&modules);
            dump::apply_dump(&self.pool, &sql, Some(&allowed)).await?
        } else {
            dump::apply_dump(&self.pool, &sql, None).await?
        };

        tracing::info!(
            "Applied {} statement(s), skipped {} for backup {}",
            stats.applied,
            stats.skipped,
            backup.id
        );

        Ok(modules)
    }

    async fn start(&self, operation_id: i64) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE restore_operations SET status = 'in_progress' \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(operation_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "Restore operation {} is not pending",
                operation_id
            )))
        }
    }

    /// Persist a step; MAX() keeps progress monotonically non-decreasing
    async fn update_progress(&self, operation_id: i64, progress: i64, step: &str) -> Result<()> {
        sqlx::query(
            "UPDATE restore_operations SET progress = MAX(progress, ?), current_step = ? \
             WHERE id = ? AND status = 'in_progress'",
        )
        .bind(progress)
        .bind(step)
        .bind(operation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(&self, operation_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE restore_operations \
             SET status = 'completed', progress = ?, current_step = ?, completed_at = ? \
             WHERE id = ? AND status = 'in_progress'",
        )
        .bind(PROGRESS_DONE)
        .bind(STEP_COMPLETED)
        .bind(Utc::now())
        .bind(operation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal failure: progress drops to 0 and the timestamp is still set
    async fn mark_failed(&self, operation_id: i64, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE restore_operations \
             SET status = 'failed', progress = 0, error_message = ?, completed_at = ? \
             WHERE id = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(message)
        .bind(Utc::now())
        .bind(operation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn lock_owner(operation_id: i64) -> String {
    format!("restore-op-{}", operation_id)
}

/// User-facing completion message. Selective restores list the restored
/// module names and note that other data was preserved.
pub fn restore_message(backup: &BackupRecord, modules: &[DataModule]) -> String {
    match backup.backup_type {
        BackupType::Full => "Database restored successfully from full backup.".to_string(),
        BackupType::Selective => {
            let names = modules
                .iter()
                .map(|m| m.display_name())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Database restored successfully. Restored modules: {}. All other data was preserved.",
                names
            )
        }
    }
}
