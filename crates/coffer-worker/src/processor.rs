//! Single-attempt thumbnail processing.

use std::sync::Arc;

use anyhow::{Context, Result};
use coffer_core::models::LogicalFile;
use coffer_core::{StorageBackend, TenantScope};
use coffer_db::Catalog;
use coffer_processing::{MediaKind, ThumbnailRenderer};
use coffer_storage::keys::thumbnail_key;
use coffer_storage::{StorageError, StorageRouter};
use uuid::Uuid;

/// Render a preview for one catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailJob {
    pub tenant_id: Uuid,
    pub upload_id: Uuid,
    pub blob_locator: String,
    pub backend: StorageBackend,
    pub extension: String,
}

impl From<&LogicalFile> for ThumbnailJob {
    fn from(file: &LogicalFile) -> Self {
        Self {
            tenant_id: file.tenant_id,
            upload_id: file.upload_id,
            blob_locator: file.blob_locator.clone(),
            backend: file.storage_backend,
            extension: file.extension.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// Preview written and recorded on the row.
    Stored(String),
    /// Not an image or video.
    Skipped,
    /// The row or its blob disappeared while the job was pending.
    Orphaned,
}

/// Everything a worker needs to run one job attempt.
pub struct ThumbnailProcessor {
    catalog: Arc<dyn Catalog>,
    storage: StorageRouter,
    renderer: Arc<dyn ThumbnailRenderer>,
}

impl ThumbnailProcessor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        storage: StorageRouter,
        renderer: Arc<dyn ThumbnailRenderer>,
    ) -> Self {
        Self {
            catalog,
            storage,
            renderer,
        }
    }

    #[tracing::instrument(skip(self, job), fields(tenant_id = %job.tenant_id, upload_id = %job.upload_id))]
    pub async fn process(&self, job: &ThumbnailJob) -> Result<ThumbnailOutcome> {
        let Some(kind) = MediaKind::from_extension(&job.extension) else {
            tracing::debug!(extension = %job.extension, "No preview for this file type");
            return Ok(ThumbnailOutcome::Skipped);
        };

        let store = self.storage.for_backend(job.backend)?;

        let data = match store.download(&job.blob_locator).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => {
                tracing::info!("Blob no longer exists; dropping thumbnail job");
                return Ok(ThumbnailOutcome::Orphaned);
            }
            Err(e) => return Err(e).context("Failed to download blob for thumbnail"),
        };

        let preview = self
            .renderer
            .render(kind, &job.extension, data)
            .await
            .context("Failed to render thumbnail")?;

        let key = thumbnail_key(job.tenant_id, job.upload_id);
        store
            .upload_with_key(&key, preview, "image/jpeg")
            .await
            .context("Failed to store thumbnail")?;

        let scope = TenantScope::new(job.tenant_id);
        let recorded = self
            .catalog
            .set_thumbnail(scope, job.upload_id, &key)
            .await
            .context("Failed to record thumbnail")?;

        if !recorded {
            // Row was purged while rendering.
            if let Err(e) = store.delete(&key).await {
                tracing::warn!(error = %e, key = %key, "Failed to delete orphaned thumbnail");
            }
            return Ok(ThumbnailOutcome::Orphaned);
        }

        tracing::info!(key = %key, "Thumbnail stored");
        Ok(ThumbnailOutcome::Stored(key))
    }
}
