use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidState(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dump failed: {0}")]
    Dump(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl AppError {
    /// Whether this error is an infrastructure fault rather than a caller
    /// mistake. Infrastructure faults get full server-side logging and a
    /// short generic client message.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Migration(_)
                | AppError::Io(_)
                | AppError::TaskJoin(_)
                | AppError::Storage(_)
                | AppError::Dump(_)
                | AppError::Archive(_)
        )
    }
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Migration(ref e) => {
                tracing::error!("Migration error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::TaskJoin(ref e) => {
                tracing::error!("Task join error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Storage(ref msg) => {
                tracing::error!("Remote storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Remote storage operation failed".to_string(),
                )
            }
            AppError::Dump(ref msg) => {
                tracing::error!("Dump error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database dump failed".to_string(),
                )
            }
            AppError::Archive(ref msg) => {
                tracing::error!("Archive error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Archive processing failed".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            AppError::Integrity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Integrity check failed: {}", msg),
            ),
        };

        let body = Json(json!({
            "success": false,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_classification() {
        assert!(AppError::Storage("drive unreachable".into()).is_infrastructure());
        assert!(AppError::Dump("disk full".into()).is_infrastructure());
        assert!(!AppError::Validation("bad module".into()).is_infrastructure());
        assert!(!AppError::InvalidState("locked".into()).is_infrastructure());
        assert!(!AppError::Integrity("checksum mismatch".into()).is_infrastructure());
    }
}
