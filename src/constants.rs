/// Timestamp format used in generated backup names
/// Produces e.g. `Full_Backup_2026-08-06_14-30-00`
pub const BACKUP_NAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Seconds after which an advisory lock on a backup record is considered stale
/// A crashed orchestrator must not block the record forever
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 1800;

/// Progress values for the named restore steps (monotonic)
pub const PROGRESS_STARTING: i64 = 10;
pub const PROGRESS_PRE_RESTORE_BACKUP: i64 = 20;
pub const PROGRESS_VERIFYING: i64 = 40;
pub const PROGRESS_RESTORING: i64 = 60;
pub const PROGRESS_DONE: i64 = 100;

/// Human-readable step labels persisted on the restore operation
pub const STEP_STARTING: &str = "Starting restore process...";
pub const STEP_PRE_RESTORE_BACKUP: &str = "Creating pre-restore backup...";
pub const STEP_VERIFYING: &str = "Verifying backup integrity...";
pub const STEP_RESTORING: &str = "Restoring database...";
pub const STEP_COMPLETED: &str = "Restore completed";

// =============================================================================
// Size estimation heuristics (advisory only)
// =============================================================================

/// Average row size in bytes assumed per table when estimating dump size.
/// Intentionally rough; the estimate is informational.
pub const AVG_ROW_BYTES: &[(&str, u64)] = &[
    ("patients", 220),
    ("prenatal_visits", 180),
    ("children", 160),
    ("immunizations", 120),
    ("vaccines", 90),
    ("vaccine_stocks", 110),
];

/// Fallback average row size for tables missing from `AVG_ROW_BYTES`
pub const AVG_ROW_BYTES_DEFAULT: u64 = 150;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message when restoring a backup that is not in `completed` status
pub const ERR_INCOMPLETE_BACKUP: &str = "Cannot restore from incomplete backup";

/// Error message for an empty module selection
pub const ERR_NO_MODULES: &str = "At least one module must be selected";

/// Error message when a restore request lacks explicit confirmation
pub const ERR_CONFIRM_REQUIRED: &str = "Restore must be explicitly confirmed";

/// Error message when a record is already locked by another operation
pub const ERR_RECORD_LOCKED: &str = "Another backup or restore is already running for this backup";
