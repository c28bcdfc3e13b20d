//! Backup orchestrator: dump -> transform -> upload -> persist.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::archive;
use crate::config::Config;
use crate::dump;
use crate::error::{AppError, Result};
use crate::models::{BackupOptions, BackupRecord, BackupStatus, DataModule};
use crate::orchestrator::{acquire_lock, get_backup, release_lock};
use crate::storage::{RemoteStorage, UploadMetadata};

/// Result of an integrity verification; pure check, mutates nothing
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct BackupOrchestrator {
    pool: SqlitePool,
    storage: Arc<dyn RemoteStorage>,
    config: Config,
}

impl BackupOrchestrator {
    pub fn new(pool: SqlitePool, storage: Arc<dyn RemoteStorage>, config: Config) -> Self {
        Self {
            pool,
            storage,
            config,
        }
    }

    /// Validate the request and persist a new `pending` backup record.
    /// The actual work happens in [`run`](Self::run), dispatched by the job
    /// layer.
    pub async fn create(
        &self,
        modules: &[DataModule],
        options: BackupOptions,
        name: Option<String>,
        actor: &str,
    ) -> Result<BackupRecord> {
        if modules.is_empty() {
            return Err(AppError::Validation(
                crate::constants::ERR_NO_MODULES.to_string(),
            ));
        }
        if options.encrypt && self.config.encryption_key.is_none() {
            return Err(AppError::Validation(
                "Encryption requested but no encryption key is configured".to_string(),
            ));
        }

        let now = Utc::now();
        let backup_type = DataModule::backup_type_for(modules);
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| BackupRecord::generate_name(backup_type, now));

        let backup_id = sqlx::query(
            "INSERT INTO backup_records \
             (name, backup_type, format, modules, status, storage_location, \
              encrypted, compressed, verified, created_by, created_at, updated_at) \
             VALUES (?, ?, 'sql_dump', ?, 'pending', ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&name)
        .bind(backup_type.as_str())
        .bind(DataModule::join(modules))
        .bind(&self.config.storage_backend)
        .bind(options.encrypt)
        .bind(options.compress)
        .bind(actor)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::info!(
            "Created {} backup record {} ({}) for {}",
            backup_type.as_str(),
            backup_id,
            name,
            actor
        );

        get_backup(&self.pool, backup_id).await
    }

    /// Execute a pending backup to its terminal state.
    ///
    /// Every failure is caught, recorded as `error_message`, and the status
    /// forced to `failed`; no record is left `in_progress`. Returns Err only
    /// when the terminal state itself could not be persisted.
    pub async fn run(&self, backup_id: i64, verify: bool) -> Result<()> {
        let owner = format!("backup-{}", backup_id);
        acquire_lock(
            &self.pool,
            backup_id,
            &owner,
            self.config.lock_timeout_secs,
        )
        .await?;

        let outcome = self.execute(backup_id, verify).await;

        let result = match outcome {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!("Backup {} failed: {}", backup_id, e);
                self.mark_failed(backup_id, &e.to_string()).await
            }
        };

        release_lock(&self.pool, backup_id, &owner).await?;
        result
    }

    /// The step sequence: dump, transform, upload, verify, complete
    async fn execute(&self, backup_id: i64, verify: bool) -> Result<()> {
        let record = get_backup(&self.pool, backup_id).await?;
        self.transition(backup_id, BackupStatus::Pending, BackupStatus::InProgress)
            .await?;

        let modules = record.module_list()?;

        // Dump the selected modules' tables to SQL text
        let sql = dump::dump_modules(&self.pool, &modules).await?;

        // Transform: compress before encrypt
        let key = if record.encrypted {
            Some(self.encryption_key()?)
        } else {
            None
        };
        let compressed = record.compressed;
        let artifact = tokio::task::spawn_blocking(move || {
            archive::seal(sql.into_bytes(), compressed, key.as_ref())
        })
        .await??;

        let checksum = archive::sha256_hex(&artifact);

        // Stage the artifact and upload it
        tokio::fs::create_dir_all(&self.config.staging_dir).await?;
        let staged = tempfile::NamedTempFile::new_in(&self.config.staging_dir)?;
        tokio::fs::write(staged.path(), &artifact).await?;

        let metadata = UploadMetadata {
            backup_name: record.name.clone(),
            content_type: "application/sql".to_string(),
        };
        let remote = self
            .storage
            .upload_file(staged.path(), &record.artifact_name(), &metadata)
            .await?;

        tracing::info!(
            "Uploaded backup {} as {} ({} bytes)",
            backup_id,
            remote.file_id,
            remote.size
        );

        sqlx::query(
            "UPDATE backup_records \
             SET remote_file_id = ?, remote_link = ?, file_size = ?, checksum = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&remote.file_id)
        .bind(&remote.link)
        .bind(remote.size as i64)
        .bind(&checksum)
        .bind(Utc::now())
        .bind(backup_id)
        .execute(&self.pool)
        .await?;

        // Verified is only set when requested and the post-upload check passes
        let verified = if verify {
            let refreshed = get_backup(&self.pool, backup_id).await?;
            let outcome = self.verify_integrity(&refreshed).await?;
            if !outcome.valid {
                tracing::warn!(
                    "Post-upload verification of backup {} failed: {:?}",
                    backup_id,
                    outcome.error
                );
            }
            outcome.valid
        } else {
            false
        };

        // Flags settle before the record turns terminal; completed records
        // are immutable except for deletion
        sqlx::query("UPDATE backup_records SET verified = ?, updated_at = ? WHERE id = ?")
            .bind(verified)
            .bind(Utc::now())
            .bind(backup_id)
            .execute(&self.pool)
            .await?;
        self.transition(backup_id, BackupStatus::InProgress, BackupStatus::Completed)
            .await?;

        Ok(())
    }

    /// Recompute the stored artifact's checksum and compare with the one
    /// captured at backup time. Pure check; mutates nothing.
    pub async fn verify_integrity(&self, record: &BackupRecord) -> Result<VerificationOutcome> {
        let Some(expected) = record.checksum.as_deref() else {
            return Ok(VerificationOutcome {
                valid: false,
                error: Some("No checksum recorded for this backup".to_string()),
            });
        };
        let Some(file_id) = record.remote_file_id.as_deref() else {
            return Ok(VerificationOutcome {
                valid: false,
                error: Some("Backup has no stored artifact".to_string()),
            });
        };

        tokio::fs::create_dir_all(&self.config.staging_dir).await?;
        let staged = tempfile::NamedTempFile::new_in(&self.config.staging_dir)?;
        if let Err(e) = self.storage.download_file(file_id, staged.path()).await {
            return Ok(VerificationOutcome {
                valid: false,
                error: Some(e.to_string()),
            });
        }

        let actual = archive::sha256_file(staged.path()).await?;
        if actual == expected {
            Ok(VerificationOutcome {
                valid: true,
                error: None,
            })
        } else {
            Ok(VerificationOutcome {
                valid: false,
                error: Some(format!(
                    "Checksum mismatch: expected {}, got {}",
                    expected, actual
                )),
            })
        }
    }

    /// Advisory size estimate for the selected modules, in MB
    pub async fn estimate_size(&self, modules: &[DataModule]) -> Result<f64> {
        if modules.is_empty() {
            return Err(AppError::Validation(
                crate::constants::ERR_NO_MODULES.to_string(),
            ));
        }
        dump::estimate_size_mb(&self.pool, modules).await
    }

    /// Delete a backup: remote blob first, then the record.
    ///
    /// If the remote delete fails the record is kept so the deletion can be
    /// retried; no orphaned remote blobs by construction.
    pub async fn delete(&self, backup_id: i64) -> Result<()> {
        let record = get_backup(&self.pool, backup_id).await?;

        if record.status == BackupStatus::InProgress {
            return Err(AppError::InvalidState(
                "Cannot delete a backup while it is running".to_string(),
            ));
        }
        if record.locked_by.is_some() {
            return Err(AppError::InvalidState(
                crate::constants::ERR_RECORD_LOCKED.to_string(),
            ));
        }

        if let Some(file_id) = record.remote_file_id.as_deref() {
            let removed = self.storage.delete_file(file_id).await?;
            if !removed {
                tracing::warn!("Remote artifact {} was already gone", file_id);
            }
        }

        sqlx::query("DELETE FROM backup_records WHERE id = ?")
            .bind(backup_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Deleted backup {} ({})", backup_id, record.name);
        Ok(())
    }

    fn encryption_key(&self) -> Result<[u8; 32]> {
        self.config.encryption_key.ok_or_else(|| {
            AppError::Validation("Encryption requested but no encryption key is configured".into())
        })
    }

    /// Guarded status transition; rejects anything outside the state machine
    async fn transition(&self, backup_id: i64, from: BackupStatus, to: BackupStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidState(format!(
                "Backup cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }
        let updated = sqlx::query(
            "UPDATE backup_records SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(backup_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "Backup {} is not in {} status",
                backup_id,
                from.as_str()
            )))
        }
    }

    /// Force a non-terminal record to `failed` with the error message
    async fn mark_failed(&self, backup_id: i64, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE backup_records SET status = 'failed', error_message = ?, updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(message)
        .bind(Utc::now())
        .bind(backup_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
