//! Filesystem-backed document content storage.
//!
//! Document bytes never live in the relational store; each document row
//! carries a `content_path` into this store. Writes are atomic (temp file
//! plus rename) so a crashed write never leaves a partial document behind.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use lexiclass_core::{ContentStore, Result};

/// Relative storage path for a document's content.
///
/// Path format: `projects/{project_id}/documents/{document_id}.txt`
pub fn content_path(project_id: i64, document_id: i64) -> String {
    format!("projects/{}/documents/{}.txt", project_id, document_id)
}

/// Content store rooted at a base directory on the local filesystem.
pub struct FilesystemContentStore {
    base_path: PathBuf,
}

impl FilesystemContentStore {
    /// Create a new filesystem content store with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, project_id: i64, document_id: i64) -> PathBuf {
        self.base_path.join(content_path(project_id, document_id))
    }

    /// Validate that the store can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch filesystem issues
    /// (overlayfs quirks, permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("projects/.health-check");
        let test_file = test_dir.join("test.txt");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"content-store-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }
}

#[async_trait]
impl ContentStore for FilesystemContentStore {
    async fn store(&self, project_id: i64, document_id: i64, content: &[u8]) -> Result<String> {
        let rel_path = content_path(project_id, document_id);
        let full_path = self.full_path(project_id, document_id);
        debug!(
            subsystem = "storage",
            component = "content_store",
            op = "store",
            project_id,
            document_id,
            size = content.len(),
            "Storing document content"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "content_store: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "content_store: File::create failed");
            e
        })?;
        file.write_all(content).await.map_err(|e| {
            warn!(error = %e, "content_store: write_all failed");
            e
        })?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "content_store: rename failed");
            e
        })?;

        Ok(rel_path)
    }

    async fn read(&self, project_id: i64, document_id: i64) -> Result<Vec<u8>> {
        let full_path = self.full_path(project_id, document_id);
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, project_id: i64, document_id: i64) -> Result<bool> {
        let full_path = self.full_path(project_id, document_id);
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_path_format() {
        assert_eq!(content_path(7, 42), "projects/7/documents/42.txt");
    }

    #[tokio::test]
    async fn test_store_read_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemContentStore::new(dir.path());

        let path = store.store(1, 100, b"hello world").await.unwrap();
        assert_eq!(path, "projects/1/documents/100.txt");

        let data = store.read(1, 100).await.unwrap();
        assert_eq!(data, b"hello world");

        assert!(store.delete(1, 100).await.unwrap());
        assert!(!store.delete(1, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemContentStore::new(dir.path());

        store.store(1, 5, b"first").await.unwrap();
        store.store(1, 5, b"second").await.unwrap();

        assert_eq!(store.read(1, 5).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemContentStore::new(dir.path());
        assert!(!store.delete(9, 9).await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemContentStore::new(dir.path());
        store.validate().await.unwrap();
    }
}
