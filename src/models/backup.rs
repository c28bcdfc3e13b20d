use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::module::DataModule;

/// Backup scope: `full` covers every module, `selective` a strict subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Selective,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Selective => "selective",
        }
    }
}

/// Lifecycle status of a backup record.
/// Transitions only along `pending -> in_progress -> {completed|failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    /// Whether the status machine permits moving to `next`
    pub fn can_transition_to(&self, next: BackupStatus) -> bool {
        matches!(
            (self, next),
            (BackupStatus::Pending, BackupStatus::InProgress)
                | (BackupStatus::InProgress, BackupStatus::Completed)
                | (BackupStatus::InProgress, BackupStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }

    /// Coarse progress percentage derived from status, for polling clients
    pub fn progress_percent(&self) -> i64 {
        match self {
            BackupStatus::Pending => 0,
            BackupStatus::InProgress => 50,
            BackupStatus::Completed => 100,
            BackupStatus::Failed => 0,
        }
    }
}

/// Options requested for a backup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupOptions {
    pub compress: bool,
    pub encrypt: bool,
    pub verify: bool,
}

impl BackupOptions {
    /// Parse the inbound `options` array (`compress` | `encrypt` | `verify`)
    pub fn parse(options: &[String]) -> Result<BackupOptions> {
        let mut parsed = BackupOptions::default();
        for option in options {
            match option.as_str() {
                "compress" => parsed.compress = true,
                "encrypt" => parsed.encrypt = true,
                "verify" => parsed.verify = true,
                other => {
                    return Err(AppError::Validation(format!(
                        "Unknown backup option: {}",
                        other
                    )))
                }
            }
        }
        Ok(parsed)
    }
}

/// Backup metadata row, exclusively owned by the backup record store
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackupRecord {
    pub id: i64,
    pub name: String,
    pub backup_type: BackupType,
    /// Artifact format; currently always `sql_dump`
    pub format: String,
    /// Comma-joined module tags (see `DataModule::join`)
    pub modules: String,
    pub status: BackupStatus,
    pub storage_location: String,
    pub remote_file_id: Option<String>,
    pub remote_link: Option<String>,
    /// SHA-256 hex digest of the final artifact, captured at backup time
    pub checksum: Option<String>,
    pub encrypted: bool,
    pub compressed: bool,
    pub verified: bool,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
    pub created_by: String,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupRecord {
    /// The modules this backup covers
    pub fn module_list(&self) -> Result<Vec<DataModule>> {
        DataModule::parse_list(&self.modules)
    }

    /// Remote object name for this backup's artifact.
    /// Extensions record the transform chain: compress before encrypt.
    pub fn artifact_name(&self) -> String {
        let mut name = format!("{}.sql", self.name);
        if self.compressed {
            name.push_str(".gz");
        }
        if self.encrypted {
            name.push_str(".enc");
        }
        name
    }

    /// Generate a backup name from the derived type and a timestamp,
    /// e.g. `Selective_Backup_2026-08-06_14-30-00`
    pub fn generate_name(backup_type: BackupType, now: DateTime<Utc>) -> String {
        let prefix = match backup_type {
            BackupType::Full => "Full_Backup",
            BackupType::Selective => "Selective_Backup",
        };
        format!(
            "{}_{}",
            prefix,
            now.format(crate::constants::BACKUP_NAME_TIMESTAMP_FORMAT)
        )
    }
}
