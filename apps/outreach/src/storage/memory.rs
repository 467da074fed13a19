//! In-process blob store for pipeline tests. No filesystem, so it is safe
//! under tokio's paused clock.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::storage::{file_extension, BlobStore, StorageError};

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn put(&self, relative_path: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(relative_path.to_string(), bytes.to_vec());
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(relative_path)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(
        &self,
        tenant_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let relative = format!("{tenant_id}/{}{}", Uuid::new_v4(), file_extension(original_name));
        self.put(&relative, bytes);
        Ok(relative)
    }

    async fn retrieve(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(relative_path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(relative_path.to_string()))
    }

    async fn delete(&self, relative_path: &str) -> Result<(), StorageError> {
        self.blobs.lock().unwrap().remove(relative_path);
        Ok(())
    }
}
