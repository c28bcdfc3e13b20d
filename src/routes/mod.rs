pub mod backup;
pub mod health;
pub mod progress;
pub mod restore;
pub mod storage;

pub use backup::{
    create_backup, delete_backup, estimate_backup_size, get_backup, list_backups, verify_backup,
};
pub use health::health_check;
pub use progress::{backup_progress, restore_progress};
pub use restore::{list_restores, request_restore};
pub use storage::storage_status;

use axum::http::HeaderMap;

/// Identify the acting user from the `X-Actor` header supplied by the
/// upstream auth layer. Authentication itself is out of scope here.
pub fn actor_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("system")
        .to_string()
}
