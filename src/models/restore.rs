use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::module::DataModule;

/// Lifecycle status of a restore operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RestoreStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RestoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStatus::Pending => "pending",
            RestoreStatus::InProgress => "in_progress",
            RestoreStatus::Completed => "completed",
            RestoreStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreStatus::Completed | RestoreStatus::Failed)
    }
}

/// Flags requested for a restore run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreFlags {
    /// Create a full pre-restore safety backup first
    pub create_backup: bool,
    /// Verify the artifact checksum before applying anything
    pub verify_integrity: bool,
    /// Filter applied statements to the backup's own module tables
    pub selective_restore: bool,
}

impl RestoreFlags {
    /// Parse the inbound `restore_options` array
    pub fn parse(options: &[String]) -> Result<RestoreFlags> {
        let mut flags = RestoreFlags::default();
        for option in options {
            match option.as_str() {
                "create_backup" => flags.create_backup = true,
                "verify_integrity" => flags.verify_integrity = true,
                "selective_restore" => flags.selective_restore = true,
                other => {
                    return Err(AppError::Validation(format!(
                        "Unknown restore option: {}",
                        other
                    )))
                }
            }
        }
        Ok(flags)
    }

    /// Comma-joined storage representation
    pub fn join(&self) -> String {
        let mut parts = Vec::new();
        if self.create_backup {
            parts.push("create_backup");
        }
        if self.verify_integrity {
            parts.push("verify_integrity");
        }
        if self.selective_restore {
            parts.push("selective_restore");
        }
        parts.join(",")
    }

    pub fn parse_joined(joined: &str) -> Result<RestoreFlags> {
        let parts: Vec<String> = joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        RestoreFlags::parse(&parts)
    }
}

/// Restore operation row. Weakly references its backup by id: deleting the
/// backup keeps the restore history intact.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RestoreOperation {
    pub id: i64,
    pub backup_id: i64,
    /// Denormalized snapshot of the backup name at restore time
    pub backup_name: String,
    /// Comma-joined module tags copied from the backup at restore time
    pub modules_restored: String,
    pub status: RestoreStatus,
    /// 0-100; monotonically non-decreasing while in progress,
    /// exactly 100 when completed, exactly 0 when failed
    pub progress: i64,
    pub current_step: String,
    pub restore_options: String,
    pub error_message: Option<String>,
    pub restored_by: String,
    pub restored_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RestoreOperation {
    pub fn module_list(&self) -> Result<Vec<DataModule>> {
        DataModule::parse_list(&self.modules_restored)
    }

    pub fn flags(&self) -> Result<RestoreFlags> {
        RestoreFlags::parse_joined(&self.restore_options)
    }
}

/// Progress may never move backwards while a restore is running
pub fn monotonic_progress(current: i64, proposed: i64) -> i64 {
    proposed.max(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let flags = RestoreFlags::parse(&[
            "create_backup".to_string(),
            "verify_integrity".to_string(),
        ])
        .unwrap();
        assert!(flags.create_backup);
        assert!(flags.verify_integrity);
        assert!(!flags.selective_restore);

        assert!(RestoreFlags::parse(&["rollback".to_string()]).is_err());
    }

    #[test]
    fn test_flags_join_roundtrip() {
        let flags = RestoreFlags {
            create_backup: true,
            verify_integrity: false,
            selective_restore: true,
        };
        let joined = flags.join();
        assert_eq!(joined, "create_backup,selective_restore");
        assert_eq!(RestoreFlags::parse_joined(&joined).unwrap(), flags);
        assert_eq!(
            RestoreFlags::parse_joined("").unwrap(),
            RestoreFlags::default()
        );
    }

    #[test]
    fn test_monotonic_progress() {
        assert_eq!(monotonic_progress(10, 40), 40);
        assert_eq!(monotonic_progress(60, 40), 60);
        assert_eq!(monotonic_progress(0, 0), 0);
    }
}
