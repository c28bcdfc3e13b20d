pub mod pool;

pub use pool::create_pool;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;

/// Fail backup records and restore operations left `in_progress` by a crash.
///
/// Background jobs do not survive a process restart, so any row still
/// `in_progress` at startup is an orphan. Its advisory lock is cleared so the
/// record can be operated on again.
pub async fn sweep_orphaned_operations(pool: &SqlitePool) -> Result<()> {
    let now = Utc::now();

    let swept_backups = sqlx::query(
        "UPDATE backup_records \
         SET status = 'failed', \
             error_message = 'Interrupted by server restart', \
             locked_by = NULL, locked_at = NULL, updated_at = ? \
         WHERE status = 'in_progress'",
    )
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();

    let swept_restores = sqlx::query(
        "UPDATE restore_operations \
         SET status = 'failed', progress = 0, \
             error_message = 'Interrupted by server restart', \
             completed_at = ? \
         WHERE status = 'in_progress'",
    )
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();

    if swept_backups > 0 || swept_restores > 0 {
        tracing::warn!(
            "Swept {} orphaned backup(s) and {} orphaned restore(s) to failed",
            swept_backups,
            swept_restores
        );
    }

    Ok(())
}
