#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{BlobStore, StorageBackend, StorageError, StorageResult, StorageRouter};
use coffer_core::Config;
use std::sync::Arc;

/// Create the Blob Store for one backend from configuration.
pub async fn create_storage(
    config: &Config,
    backend: StorageBackend,
) -> StorageResult<Arc<dyn BlobStore>> {
    match backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.s3_endpoint().map(String::from);

            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config
                .local_storage_path()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
                })?;

            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

/// Build a router whose primary is the configured backend. The other backend is
/// registered too when its settings are present, so older rows remain reachable.
pub async fn create_router(config: &Config) -> StorageResult<StorageRouter> {
    let primary_backend = config.storage_backend();
    let primary = create_storage(config, primary_backend).await?;
    let mut router = StorageRouter::new(primary);

    let secondary = match primary_backend {
        StorageBackend::Local if config.s3_bucket().is_some() => Some(StorageBackend::S3),
        StorageBackend::S3 if config.local_storage_path().is_some() => {
            Some(StorageBackend::Local)
        }
        _ => None,
    };

    if let Some(backend) = secondary {
        match create_storage(config, backend).await {
            Ok(store) => router = router.with_store(store),
            Err(e) => tracing::warn!(
                backend = %backend,
                error = %e,
                "Secondary storage backend unavailable; rows stored there cannot be read"
            ),
        }
    }

    Ok(router)
}
