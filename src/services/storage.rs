//! Object storage for uploaded source documents.
//!
//! DESIGN
//! ======
//! `ObjectStore` is the seam between course services and wherever files
//! live. `LocalObjectStore` keeps objects under a root directory using
//! slash-separated keys (`courses/{id}/v3/sop.pdf`). Writes go to a temp file
//! that is synced and renamed into place so readers never see partial files.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage path: {0}")]
    InvalidPath(String),
    #[error("storage io error on {path}: {message}")]
    Io { path: String, message: String },
}

impl crate::error::ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "E_STORAGE_PATH",
            Self::Io { .. } => "E_STORAGE_IO",
        }
    }
}

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub checksum: String,
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing object.
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<StoredObject, StorageError>;

    /// Remove objects. Missing objects are skipped.
    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;
}

/// Filesystem-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a storage key below the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Io { path: path.display().to_string(), message: err.to_string() }
}

#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<StoredObject, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }

        let mut temp_name = target.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp = PathBuf::from(temp_name);

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error(&temp, &e))?;
        drop(file);
        fs::rename(&temp, &target)
            .await
            .map_err(|e| io_error(&target, &e))?;

        let stored = StoredObject { path: path.to_string(), size: bytes.len() as u64, checksum: checksum(bytes) };
        info!(path, size = stored.size, content_type, "storage: object stored");
        Ok(stored)
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        for key in paths {
            let target = self.resolve(key)?;
            match fs::remove_file(&target).await {
                Ok(()) => info!(path = %key, "storage: object removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %key, "storage: remove skipped, object missing");
                }
                Err(e) => return Err(io_error(&target, &e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
