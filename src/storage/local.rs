//! Filesystem-backed storage backend.
//!
//! Stores each artifact as a file under a root directory. The file name is
//! the file id; the link is a `file://` URL. Used as the deployable fallback
//! when no cloud backend is configured, and as the backend in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::{RemoteFile, RemoteStorage, StorageQuota, UploadMetadata};

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn blob_path(&self, file_id: &str) -> Result<PathBuf> {
        // File ids are flat names; reject anything that escapes the root
        if file_id.is_empty()
            || file_id.contains('/')
            || file_id.contains('\\')
            || file_id.contains("..")
        {
            return Err(AppError::Storage(format!("Invalid file id: {}", file_id)));
        }
        Ok(self.root.join(file_id))
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Storage(format!("cannot create storage root: {}", e)))
    }
}

#[async_trait]
impl RemoteStorage for LocalStorage {
    async fn test_connection(&self) -> bool {
        self.ensure_root().await.is_ok()
    }

    async fn is_authenticated(&self) -> bool {
        // The filesystem needs no credential flow
        true
    }

    async fn storage_quota(&self) -> Result<StorageQuota> {
        self.ensure_root().await?;
        let mut used_bytes = 0u64;
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
        {
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    used_bytes += meta.len();
                }
            }
        }
        // Local disks report no hard quota; advertise a nominal 15 GB
        Ok(StorageQuota {
            used_bytes,
            total_bytes: 15 * 1024 * 1024 * 1024,
        })
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        _metadata: &UploadMetadata,
    ) -> Result<RemoteFile> {
        self.ensure_root().await?;
        let destination = self.blob_path(remote_name)?;
        tokio::fs::copy(local_path, &destination)
            .await
            .map_err(|e| AppError::Storage(format!("upload failed: {}", e)))?;

        let size = tokio::fs::metadata(&destination)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
            .len();

        tracing::debug!("Stored artifact {} ({} bytes)", remote_name, size);

        Ok(RemoteFile {
            file_id: remote_name.to_string(),
            link: format!("file://{}", destination.display()),
            size,
        })
    }

    async fn download_file(&self, file_id: &str, destination: &Path) -> Result<()> {
        let source = self.blob_path(file_id)?;
        if !source.exists() {
            return Err(AppError::Storage(format!(
                "artifact not found in storage: {}",
                file_id
            )));
        }
        tokio::fs::copy(&source, destination)
            .await
            .map_err(|e| AppError::Storage(format!("download failed: {}", e)))?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<bool> {
        let path = self.blob_path(file_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!("delete failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> LocalStorage {
        LocalStorage::new(dir.path().join("remote"))
    }

    #[tokio::test]
    async fn test_upload_download_delete_cycle() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let local = dir.path().join("artifact.sql");
        tokio::fs::write(&local, b"DELETE FROM patients;").await.unwrap();

        let remote = storage
            .upload_file(&local, "Backup_1.sql", &UploadMetadata::default())
            .await
            .unwrap();
        assert_eq!(remote.file_id, "Backup_1.sql");
        assert_eq!(remote.size, 21);

        let fetched = dir.path().join("fetched.sql");
        storage.download_file("Backup_1.sql", &fetched).await.unwrap();
        assert_eq!(
            tokio::fs::read(&fetched).await.unwrap(),
            b"DELETE FROM patients;"
        );

        assert!(storage.delete_file("Backup_1.sql").await.unwrap());
        // Second delete reports the blob already gone
        assert!(!storage.delete_file("Backup_1.sql").await.unwrap());
        assert!(storage.download_file("Backup_1.sql", &fetched).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_escapes() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let dest = dir.path().join("out");
        assert!(storage.download_file("../etc/passwd", &dest).await.is_err());
        assert!(storage.delete_file("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_quota_counts_stored_blobs() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert!(storage.test_connection().await);
        assert!(storage.is_authenticated().await);

        let local = dir.path().join("a.sql");
        tokio::fs::write(&local, vec![0u8; 100]).await.unwrap();
        storage
            .upload_file(&local, "a.sql", &UploadMetadata::default())
            .await
            .unwrap();

        let quota = storage.storage_quota().await.unwrap();
        assert_eq!(quota.used_bytes, 100);
        assert!(quota.total_bytes > quota.used_bytes);
    }
}
