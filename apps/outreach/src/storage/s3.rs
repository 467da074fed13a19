use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;
use uuid::Uuid;

use crate::storage::{file_extension, BlobStore, StorageError};

/// S3-compatible backend (MinIO locally, AWS in production). Object keys use
/// the same `{tenantId}/{uuid}{ext}` layout as the filesystem backend.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

/// Object keys have no filesystem to escape, but a key must still be a plain
/// relative path with no `.`/`..` segments so it cannot alias another tenant.
fn validate_key(key: &str) -> Result<&str, StorageError> {
    let bad_segment = key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if key.is_empty() || key.contains('\\') || bad_segment {
        return Err(StorageError::PathTraversal(key.to_string()));
    }
    Ok(key)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn store(
        &self,
        tenant_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let key = format!("{tenant_id}/{}{}", Uuid::new_v4(), file_extension(original_name));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("S3 upload failed: {e}")))?;

        info!("Uploaded blob to s3://{}/{}", self.bucket, key);
        Ok(key)
    }

    async fn retrieve(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        let key = validate_key(relative_path)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Remote(format!("S3 download failed: {e}"))
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Remote(format!("S3 body read failed: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, relative_path: &str) -> Result<(), StorageError> {
        let key = validate_key(relative_path)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("S3 delete failed: {e}")))?;
        info!("Deleted blob s3://{}/{}", self.bucket, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_tenant_layout() {
        let key = format!("{}/{}.pdf", Uuid::new_v4(), Uuid::new_v4());
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_validate_key_rejects_escapes() {
        for key in ["", "/abs/key", "a/../b", "./a", "a//b", "a\\b", ".."] {
            assert!(
                matches!(validate_key(key), Err(StorageError::PathTraversal(_))),
                "{key}"
            );
        }
    }
}
