//! Remote storage abstraction for backup artifacts.
//!
//! Backends implement [`RemoteStorage`] so the orchestrators never care where
//! artifacts live. The `local` backend keeps blobs in a directory on disk and
//! doubles as the fallback for deployments without cloud credentials.

pub mod local;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Quota snapshot reported by the backend
#[derive(Debug, Clone, Serialize)]
pub struct StorageQuota {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Metadata attached to an uploaded artifact
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    pub backup_name: String,
    pub content_type: String,
}

/// Handle to an uploaded artifact
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub file_id: String,
    pub link: String,
    pub size: u64,
}

/// Provides a unified interface for backup artifact storage
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Whether the backend is reachable
    async fn test_connection(&self) -> bool;

    /// Whether credentials are present and valid (OAuth-style flows)
    async fn is_authenticated(&self) -> bool;

    /// Used/total space on the backend
    async fn storage_quota(&self) -> Result<StorageQuota>;

    /// Upload a local file under the given remote name
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        metadata: &UploadMetadata,
    ) -> Result<RemoteFile>;

    /// Download a stored artifact to a local path
    async fn download_file(&self, file_id: &str, destination: &Path) -> Result<()>;

    /// Delete a stored artifact; Ok(false) when it was already gone
    async fn delete_file(&self, file_id: &str) -> Result<bool>;
}

/// Create the storage backend named in the configuration
pub fn create_storage(config: &Config) -> Result<Arc<dyn RemoteStorage>> {
    match config.storage_backend.as_str() {
        "local" => Ok(Arc::new(local::LocalStorage::new(
            config.storage_root.clone(),
        ))),
        other => Err(AppError::Validation(format!(
            "Unknown storage backend: {}",
            other
        ))),
    }
}
