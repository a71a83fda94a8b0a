//! Blob Store abstraction trait
//!
//! Every storage backend implements [`BlobStore`]. Callers hand over bytes and get
//! back an opaque locator; they never see paths, buckets or URLs.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use coffer_core::AppError;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            // Keys stay in the log; callers only ever see upload ids.
            StorageError::NotFound(key) => {
                tracing::warn!(blob_locator = %key, "Blob missing from store");
                AppError::NotFound("File content not found".to_string())
            }
            StorageError::InvalidKey(msg) => {
                tracing::warn!(error = %msg, "Rejected storage key");
                AppError::InvalidInput("Invalid storage key".to_string())
            }
            other => AppError::BackendUnavailable(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Byte stream returned by [`BlobStore::download_stream`].
pub type BlobStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Reader consumed by [`BlobStore::upload_stream`].
pub type BlobReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Blob Store abstraction
///
/// **Key format:** `blobs/{tenant_id}/{uuid}.{ext}` for content written through
/// [`upload`](BlobStore::upload) and [`upload_stream`](BlobStore::upload_stream).
/// See the crate root documentation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a freshly generated key and return that key (the locator).
    async fn upload(
        &self,
        tenant_id: Uuid,
        extension: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Store bytes under a caller-chosen key, replacing any existing object.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Store the contents of `reader` (consumed until EOF) under a freshly generated key.
    ///
    /// Used for merged chunk uploads so the whole file never sits in memory.
    async fn upload_stream(
        &self,
        tenant_id: Uuid,
        extension: &str,
        content_type: &str,
        content_length: Option<u64>,
        reader: BlobReader,
    ) -> StorageResult<String>;

    async fn download(&self, storage_key: &str) -> StorageResult<Bytes>;

    async fn download_stream(&self, storage_key: &str) -> StorageResult<BlobStream>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64>;

    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::ErrorMetadata;

    #[test]
    fn test_missing_blob_hides_locator() {
        let key = "blobs/7d0c/2f4e.txt";
        let err = AppError::from(StorageError::NotFound(key.to_string()));
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!err.to_string().contains(key));
        assert!(!err.client_message().contains(key));
    }

    #[test]
    fn test_backend_failure_is_generic_for_clients() {
        let err = AppError::from(StorageError::UploadFailed("bucket-a/blobs/x: reset".to_string()));
        assert!(matches!(err, AppError::BackendUnavailable(_)));
        assert_eq!(err.client_message(), "Failed to access storage");

        let err = AppError::from(StorageError::InvalidKey("../etc/passwd".to_string()));
        assert!(!err.client_message().contains("passwd"));
    }
}
