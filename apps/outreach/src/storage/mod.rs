//! Tenant-scoped blob storage for uploaded CV files.
//!
//! Layout: `{root}/{tenantId}/{uuid}{ext}`. Callers only ever see the relative
//! path `{tenantId}/{uuid}{ext}`; every read or delete re-resolves it against
//! the root and rejects anything that lands outside.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod s3;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("path escapes storage root: {0}")]
    PathTraversal(String),

    #[error("object store error: {0}")]
    Remote(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes` under the tenant's directory and returns the relative path.
    async fn store(
        &self,
        tenant_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError>;

    async fn retrieve(&self, relative_path: &str) -> Result<Vec<u8>, StorageError>;

    /// Removing a blob that does not exist is logged, not an error.
    async fn delete(&self, relative_path: &str) -> Result<(), StorageError>;
}

/// Local-filesystem backend rooted at the configured base path.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref();
        let absolute = if base_path.is_absolute() {
            base_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(base_path)
        };
        let root = normalize(&absolute);
        tokio::fs::create_dir_all(&root).await?;
        info!("File storage initialized at: {}", root.display());
        Ok(Self { root })
    }

    /// Joins `relative_path` onto the root, normalizes `.`/`..` lexically and
    /// rejects the result unless it stays under the root.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, StorageError> {
        let resolved = normalize(&self.root.join(relative_path));
        if !resolved.starts_with(&self.root) || resolved == self.root {
            warn!("Rejected storage path outside root: {relative_path}");
            return Err(StorageError::PathTraversal(relative_path.to_string()));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        tenant_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let tenant_dir = self.root.join(tenant_id.to_string());
        tokio::fs::create_dir_all(&tenant_dir).await?;

        let stored_name = format!("{}{}", Uuid::new_v4(), file_extension(original_name));
        tokio::fs::write(tenant_dir.join(&stored_name), bytes).await?;

        let relative = format!("{tenant_id}/{stored_name}");
        info!("File stored successfully: {relative} ({} bytes)", bytes.len());
        Ok(relative)
    }

    async fn retrieve(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(relative_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {relative_path}", bytes.len());
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(relative_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, relative_path: &str) -> Result<(), StorageError> {
        let path = self.resolve(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("File deleted successfully: {relative_path}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File not found for deletion: {relative_path}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Returns the extension of `filename` including the dot, or "" when there is
/// none or it is not a plain alphanumeric suffix.
pub fn file_extension(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(idx) if idx > 0 => {
            let ext = &name[idx + 1..];
            if !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                format!(".{}", ext.to_ascii_lowercase())
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

/// Lexical normalization: drops `.` and folds `..` into its parent. Does not
/// touch the filesystem, so it also works for paths that do not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
