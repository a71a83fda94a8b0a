//! File service
//!
//! Entry points for callers. Every operation that changes the catalog runs in one
//! unit of work per tenant: the capacity check, the catalog change and the quota
//! delta commit together or not at all. Blob deletes happen after commit and only
//! for blobs no row references any more.
//!
//! Ingest runs in two phases so blob bytes are never written while the tenant is
//! locked: a read-only pre-check (version plan, capacity, dedup lookup), the blob
//! write, then the authoritative unit of work that repeats every check.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use coffer_core::models::{LifecycleState, LogicalFile, NewLogicalFile, StorageStats};
use coffer_core::{AppError, StorageBackend, TenantScope};
use coffer_db::{finish_unit_of_work, Catalog, UnitOfWork};
use coffer_processing::MediaKind;
use coffer_storage::{BlobStream, StorageRouter};
use coffer_worker::{ThumbnailJob, ThumbnailQueue};
use uuid::Uuid;

use crate::cache::{cache_aside, TtlCache};
use crate::chunk::{ChunkAck, ChunkAssembler};
use crate::config::EngineConfig;
use crate::digest::digest;
use crate::naming::{extension_of, mime_type_for, validate_file_name};
use crate::quota;
use crate::version::{apply_plan, VersionPolicy, WritePlan};

/// A blob on a specific backend.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredBlob {
    backend: StorageBackend,
    locator: String,
}

struct Ingested {
    file: LogicalFile,
    instant_upload: bool,
    garbage: Vec<StoredBlob>,
}

pub struct FileService {
    catalog: Arc<dyn Catalog>,
    storage: StorageRouter,
    assembler: Arc<ChunkAssembler>,
    thumbnails: Option<Arc<ThumbnailQueue>>,
    stats_cache: TtlCache<Uuid, StorageStats>,
    config: EngineConfig,
}

impl FileService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        storage: StorageRouter,
        assembler: Arc<ChunkAssembler>,
        thumbnails: Option<Arc<ThumbnailQueue>>,
        config: EngineConfig,
    ) -> Self {
        let stats_cache = TtlCache::new(config.stats_cache_capacity);
        Self {
            catalog,
            storage,
            assembler,
            thumbnails,
            stats_cache,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn assembler(&self) -> &Arc<ChunkAssembler> {
        &self.assembler
    }

    // ----- ingest -----

    pub async fn initiate_chunked_upload(&self, scope: TenantScope) -> Result<Uuid, AppError> {
        self.assembler.open_session(scope).await
    }

    /// Stage one chunk. `file_name` and `folder_id` are taken from
    /// [`merge_chunks`](Self::merge_chunks); here they are only validated and logged.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, data), fields(tenant_id = %scope, chunk_bytes = data.len()))]
    pub async fn upload_chunk(
        &self,
        scope: TenantScope,
        session_id: Uuid,
        index: u32,
        total_chunks: u32,
        file_name: &str,
        folder_id: Option<Uuid>,
        data: Bytes,
    ) -> Result<ChunkAck, AppError> {
        validate_file_name(file_name)?;
        self.assembler
            .write_chunk(scope, session_id, index, total_chunks, data)
            .await
    }

    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn merge_chunks(
        &self,
        scope: TenantScope,
        session_id: Uuid,
        file_name: &str,
        folder_id: Option<Uuid>,
    ) -> Result<LogicalFile, AppError> {
        let start = Instant::now();
        let file_name = validate_file_name(file_name)?;
        let extension = extension_of(&file_name);
        let mime_type = mime_type_for(&extension);

        let staged_bytes = self.assembler.staged_bytes(scope, session_id).await?;
        self.precheck(scope, &file_name, folder_id, staged_bytes as i64, None)
            .await?;

        let store = self.storage.primary();
        let merged = self
            .assembler
            .merge(scope, session_id, store.as_ref(), &extension, &mime_type)
            .await?;

        let candidate = NewLogicalFile {
            file_name,
            blob_locator: merged.blob_locator.clone(),
            folder_id,
            extension,
            size_bytes: merged.size_bytes as i64,
            mime_type,
            storage_backend: merged.backend,
            content_digest: merged.content_digest.clone(),
        };
        let fresh = StoredBlob {
            backend: merged.backend,
            locator: merged.blob_locator,
        };

        match self.commit_ingest(scope, candidate, Some(fresh)).await {
            Ok(Some(file)) => {
                if let Err(e) = self.assembler.finish(scope, session_id).await {
                    tracing::warn!(error = %e, session_id = %session_id, "Failed to remove staging area");
                }
                tracing::info!(
                    upload_id = %file.upload_id,
                    session_id = %session_id,
                    size_bytes = file.size_bytes,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Chunked upload completed"
                );
                Ok(file)
            }
            Ok(None) => {
                self.assembler.release(scope, session_id).await;
                Err(AppError::Internal(
                    "Merged upload was not cataloged".to_string(),
                ))
            }
            Err(e) => {
                self.assembler.release(scope, session_id).await;
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self, data), fields(tenant_id = %scope, size_bytes = data.len()))]
    pub async fn upload_whole(
        &self,
        scope: TenantScope,
        data: Bytes,
        file_name: &str,
        folder_id: Option<Uuid>,
    ) -> Result<LogicalFile, AppError> {
        let file_name = validate_file_name(file_name)?;
        if data.len() as u64 > self.config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File of {} bytes exceeds maximum of {} bytes",
                data.len(),
                self.config.max_file_size_bytes
            )));
        }

        let extension = extension_of(&file_name);
        let mime_type = mime_type_for(&extension);
        let size_bytes = data.len() as i64;
        let content_digest = digest(&data);

        let dedup_hit = self
            .precheck(scope, &file_name, folder_id, size_bytes, Some(&content_digest))
            .await?;

        let mut candidate = NewLogicalFile {
            file_name,
            blob_locator: String::new(),
            folder_id,
            extension,
            size_bytes,
            mime_type,
            storage_backend: self.storage.primary_backend(),
            content_digest,
        };

        let fresh = match dedup_hit {
            Some(_) => None,
            None => Some(self.store_bytes(scope, &candidate, data.clone()).await?),
        };
        if let Some(blob) = &fresh {
            candidate.blob_locator = blob.locator.clone();
            candidate.storage_backend = blob.backend;
        }

        if let Some(file) = self.commit_ingest(scope, candidate.clone(), fresh).await? {
            return Ok(file);
        }

        // The row we meant to share a blob with was purged in between.
        let blob = self.store_bytes(scope, &candidate, data).await?;
        candidate.blob_locator = blob.locator.clone();
        candidate.storage_backend = blob.backend;
        self.commit_ingest(scope, candidate, Some(blob))
            .await?
            .ok_or_else(|| AppError::Internal("Upload was not cataloged".to_string()))
    }

    async fn store_bytes(
        &self,
        scope: TenantScope,
        candidate: &NewLogicalFile,
        data: Bytes,
    ) -> Result<StoredBlob, AppError> {
        let store = self.storage.primary();
        let locator = store
            .upload(
                scope.tenant_id(),
                &candidate.extension,
                &candidate.mime_type,
                data,
            )
            .await?;
        Ok(StoredBlob {
            backend: store.backend_type(),
            locator,
        })
    }

    /// Read-only run of the ingest checks. Returns the dedup match, if any.
    async fn precheck(
        &self,
        scope: TenantScope,
        file_name: &str,
        folder_id: Option<Uuid>,
        size_bytes: i64,
        content_digest: Option<&str>,
    ) -> Result<Option<LogicalFile>, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = self
            .precheck_in(uow.as_mut(), file_name, folder_id, size_bytes, content_digest)
            .await;
        if let Err(e) = uow.rollback().await {
            tracing::warn!(error = %e, "Failed to release pre-check unit of work");
        }
        result
    }

    async fn precheck_in(
        &self,
        uow: &mut dyn UnitOfWork,
        file_name: &str,
        folder_id: Option<Uuid>,
        size_bytes: i64,
        content_digest: Option<&str>,
    ) -> Result<Option<LogicalFile>, AppError> {
        let plan = plan_for_name(uow, &self.config.versioning, folder_id, file_name).await?;
        quota::check_capacity(uow, plan.quota_delta(size_bytes)).await?;
        match content_digest {
            Some(d) => uow.find_by_digest(d).await,
            None => Ok(None),
        }
    }

    /// Authoritative ingest. `Ok(None)` means `fresh` was `None` and the dedup
    /// source disappeared, so the caller has to write the bytes after all.
    async fn commit_ingest(
        &self,
        scope: TenantScope,
        candidate: NewLogicalFile,
        fresh: Option<StoredBlob>,
    ) -> Result<Option<LogicalFile>, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = self.ingest_in(uow.as_mut(), candidate, fresh.as_ref()).await;

        match finish_unit_of_work(uow, result).await {
            Ok(Some(ingested)) => {
                tracing::info!(
                    tenant_id = %scope,
                    upload_id = %ingested.file.upload_id,
                    file_name = %ingested.file.file_name,
                    version = ingested.file.version_number,
                    size_bytes = ingested.file.size_bytes,
                    instant_upload = ingested.instant_upload,
                    "File ingested"
                );
                self.after_commit(scope, ingested.garbage).await;
                self.schedule_thumbnail(&ingested.file);
                Ok(Some(ingested.file))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                if let Some(blob) = fresh {
                    self.delete_blobs(vec![blob]).await;
                }
                Err(e)
            }
        }
    }

    async fn ingest_in(
        &self,
        uow: &mut dyn UnitOfWork,
        mut candidate: NewLogicalFile,
        fresh: Option<&StoredBlob>,
    ) -> Result<Option<Ingested>, AppError> {
        let mut garbage = Vec::new();
        let mut instant_upload = false;

        match (uow.find_by_digest(&candidate.content_digest).await?, fresh) {
            (Some(existing), fresh) => {
                candidate.blob_locator = existing.blob_locator;
                candidate.storage_backend = existing.storage_backend;
                instant_upload = true;
                if let Some(unused) = fresh {
                    garbage.push(unused.clone());
                }
            }
            (None, Some(_)) => {}
            (None, None) => return Ok(None),
        }

        let plan = plan_for_name(
            uow,
            &self.config.versioning,
            candidate.folder_id,
            &candidate.file_name,
        )
        .await?;
        let delta = plan.quota_delta(candidate.size_bytes);
        quota::check_capacity(uow, delta).await?;

        let file = apply_plan(uow, &plan, candidate).await?;
        garbage.extend(collect_garbage(uow, plan.removed_rows()).await?);
        quota::apply_delta(uow, delta).await?;

        Ok(Some(Ingested {
            file,
            instant_upload,
            garbage,
        }))
    }

    // ----- versions -----

    /// Every row of the file's chain, newest version first.
    pub async fn list_versions(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
    ) -> Result<Vec<LogicalFile>, AppError> {
        let file = self.get_file(scope, upload_id).await?;
        let mut chain = self.catalog.list_chain(scope, file.chain_root()).await?;
        chain.reverse();
        Ok(chain)
    }

    pub async fn get_file(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
    ) -> Result<LogicalFile, AppError> {
        self.catalog
            .find_file(scope, upload_id)
            .await?
            .ok_or_else(|| file_not_found(upload_id))
    }

    /// Append a copy of `target_id` as the chain's new latest version.
    ///
    /// `upload_id` is the version the caller believes is latest; if the chain has
    /// moved on since, the restore fails with `Conflict` and changes nothing.
    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn restore_version(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
        target_id: Uuid,
    ) -> Result<LogicalFile, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = self
            .restore_version_in(uow.as_mut(), upload_id, target_id)
            .await;
        let (file, garbage) = finish_unit_of_work(uow, result).await?;

        tracing::info!(
            upload_id = %file.upload_id,
            restored_from = %target_id,
            version = file.version_number,
            "Version restored"
        );
        self.after_commit(scope, garbage).await;
        self.schedule_thumbnail(&file);
        Ok(file)
    }

    async fn restore_version_in(
        &self,
        uow: &mut dyn UnitOfWork,
        upload_id: Uuid,
        target_id: Uuid,
    ) -> Result<(LogicalFile, Vec<StoredBlob>), AppError> {
        let current = uow
            .get_for_update(upload_id)
            .await?
            .filter(LogicalFile::is_active)
            .ok_or_else(|| file_not_found(upload_id))?;
        let chain = uow.chain(current.chain_root()).await?;

        if !current.is_latest {
            let latest = chain
                .iter()
                .find(|f| f.is_latest)
                .ok_or_else(|| file_not_found(upload_id))?;
            tracing::warn!(
                upload_id = %upload_id,
                latest_id = %latest.upload_id,
                latest_version = latest.version_number,
                "Restore rejected: chain advanced"
            );
            return Err(AppError::Conflict {
                upload_id,
                latest_id: latest.upload_id,
                latest_version: latest.version_number,
            });
        }

        let target = chain
            .iter()
            .find(|f| f.upload_id == target_id && f.is_active())
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Version {} not found in the history of {}",
                    target_id, upload_id
                ))
            })?;

        let plan = self.config.versioning.plan_append(chain)?;
        let delta = plan.quota_delta(target.size_bytes);
        quota::check_capacity(uow, delta).await?;

        let file = apply_plan(uow, &plan, NewLogicalFile::from(&target)).await?;
        let garbage = collect_garbage(uow, plan.removed_rows()).await?;
        quota::apply_delta(uow, delta).await?;
        Ok((file, garbage))
    }

    // ----- lifecycle -----

    /// Move the chains of `upload_ids` to the trash. Returns the number of rows trashed.
    #[tracing::instrument(skip(self, upload_ids), fields(tenant_id = %scope, requested = upload_ids.len()))]
    pub async fn soft_delete(
        &self,
        scope: TenantScope,
        upload_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = soft_delete_in(uow.as_mut(), upload_ids).await;
        let (count, released) = finish_unit_of_work(uow, result).await?;

        tracing::info!(rows = count, released_bytes = released, "Files moved to trash");
        self.after_commit(scope, Vec::new()).await;
        Ok(count)
    }

    /// Bring trashed chains back. Returns the number of rows restored.
    #[tracing::instrument(skip(self, upload_ids), fields(tenant_id = %scope, requested = upload_ids.len()))]
    pub async fn restore_from_trash(
        &self,
        scope: TenantScope,
        upload_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = restore_from_trash_in(uow.as_mut(), upload_ids).await;
        let (count, restored) = finish_unit_of_work(uow, result).await?;

        tracing::info!(rows = count, restored_bytes = restored, "Files restored from trash");
        self.after_commit(scope, Vec::new()).await;
        Ok(count)
    }

    /// Remove the chains of `upload_ids` from the catalog and delete their blobs.
    /// Returns the number of rows removed.
    #[tracing::instrument(skip(self, upload_ids), fields(tenant_id = %scope, requested = upload_ids.len()))]
    pub async fn purge(&self, scope: TenantScope, upload_ids: &[Uuid]) -> Result<u64, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = purge_in(uow.as_mut(), upload_ids).await;
        let (count, garbage) = finish_unit_of_work(uow, result).await?;

        tracing::info!(
            rows = count,
            deleted_blobs = garbage.len(),
            state = %LifecycleState::Purged,
            "Files purged"
        );
        self.after_commit(scope, garbage).await;
        Ok(count)
    }

    /// Rename every version of the file's chain.
    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn rename(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
        new_name: &str,
    ) -> Result<LogicalFile, AppError> {
        let new_name = validate_file_name(new_name)?;
        let mut uow = self.catalog.begin(scope).await?;
        let result = relocate_in(uow.as_mut(), upload_id, Some(&new_name), None).await;
        finish_unit_of_work(uow, result).await
    }

    /// Move every version of the file's chain to `folder_id` (`None` is the root).
    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn move_file(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
        folder_id: Option<Uuid>,
    ) -> Result<LogicalFile, AppError> {
        let mut uow = self.catalog.begin(scope).await?;
        let result = relocate_in(uow.as_mut(), upload_id, None, Some(folder_id)).await;
        finish_unit_of_work(uow, result).await
    }

    /// Open an active file for reading and count the download.
    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn download(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
    ) -> Result<(LogicalFile, BlobStream), AppError> {
        let mut file = self
            .catalog
            .find_file(scope, upload_id)
            .await?
            .filter(LogicalFile::is_active)
            .ok_or_else(|| file_not_found(upload_id))?;

        let store = self.storage.for_backend(file.storage_backend)?;
        let stream = store.download_stream(&file.blob_locator).await?;
        self.catalog.record_download(scope, upload_id).await?;
        file.download_count += 1;
        Ok((file, stream))
    }

    // ----- quota -----

    pub async fn get_storage_stats(&self, scope: TenantScope) -> Result<StorageStats, AppError> {
        let catalog = Arc::clone(&self.catalog);
        cache_aside(
            &self.stats_cache,
            scope.tenant_id(),
            self.config.stats_cache_ttl,
            || async move {
                let account = catalog.storage_account(scope).await?;
                Ok::<_, AppError>(StorageStats::from(&account))
            },
        )
        .await
    }

    /// Explicit quota override. `None` removes the limit.
    #[tracing::instrument(skip(self), fields(tenant_id = %scope))]
    pub async fn set_quota(
        &self,
        scope: TenantScope,
        quota_bytes: Option<i64>,
    ) -> Result<StorageStats, AppError> {
        if quota_bytes.is_some_and(|q| q < 0) {
            return Err(AppError::InvalidInput(
                "Quota must not be negative".to_string(),
            ));
        }
        let account = self.catalog.set_quota(scope, quota_bytes).await?;
        self.stats_cache.invalidate(&scope.tenant_id());
        tracing::info!(quota_bytes = ?quota_bytes, used_bytes = account.used_bytes, "Quota updated");
        Ok(StorageStats::from(&account))
    }

    // ----- helpers -----

    async fn after_commit(&self, scope: TenantScope, garbage: Vec<StoredBlob>) {
        self.stats_cache.invalidate(&scope.tenant_id());
        self.delete_blobs(garbage).await;
    }

    async fn delete_blobs(&self, blobs: Vec<StoredBlob>) {
        for blob in blobs {
            let deleted = match self.storage.for_backend(blob.backend) {
                Ok(store) => store.delete(&blob.locator).await,
                Err(e) => Err(e),
            };
            if let Err(e) = deleted {
                tracing::warn!(
                    error = %e,
                    blob_locator = %blob.locator,
                    backend = %blob.backend,
                    "Failed to delete unreferenced blob"
                );
            }
        }
    }

    fn schedule_thumbnail(&self, file: &LogicalFile) {
        if !self.config.thumbnails_enabled {
            return;
        }
        let Some(queue) = &self.thumbnails else {
            return;
        };
        if MediaKind::from_extension(&file.extension).is_none() {
            return;
        }
        queue.enqueue(ThumbnailJob::from(file));
    }
}

fn file_not_found(upload_id: Uuid) -> AppError {
    AppError::NotFound(format!("File {} not found", upload_id))
}

async fn plan_for_name(
    uow: &mut dyn UnitOfWork,
    policy: &VersionPolicy,
    folder_id: Option<Uuid>,
    file_name: &str,
) -> Result<WritePlan, AppError> {
    let chain = match uow.find_latest_by_name(folder_id, file_name).await? {
        Some(head) => uow.chain(head.chain_root()).await?,
        None => Vec::new(),
    };
    policy.plan(chain)
}

/// Blobs and previews of `removed` rows that nothing references any more.
/// Must run after the rows are deleted, inside the same unit of work.
async fn collect_garbage(
    uow: &mut dyn UnitOfWork,
    removed: &[LogicalFile],
) -> Result<Vec<StoredBlob>, AppError> {
    let mut garbage = Vec::new();
    let mut seen = HashSet::new();
    for row in removed {
        if let Some(thumbnail) = &row.thumbnail_locator {
            garbage.push(StoredBlob {
                backend: row.storage_backend,
                locator: thumbnail.clone(),
            });
        }
        if !seen.insert(row.blob_locator.clone()) {
            continue;
        }
        if uow.blob_references(&row.blob_locator).await? == 0 {
            garbage.push(StoredBlob {
                backend: row.storage_backend,
                locator: row.blob_locator.clone(),
            });
        }
    }
    Ok(garbage)
}

/// Distinct chains (version order) containing `upload_ids`. Unknown ids are skipped.
async fn chains_of(
    uow: &mut dyn UnitOfWork,
    upload_ids: &[Uuid],
) -> Result<Vec<Vec<LogicalFile>>, AppError> {
    let mut roots = HashSet::new();
    let mut chains = Vec::new();
    for &upload_id in upload_ids {
        let Some(row) = uow.get_for_update(upload_id).await? else {
            tracing::debug!(upload_id = %upload_id, "Skipping unknown file");
            continue;
        };
        if roots.insert(row.chain_root()) {
            chains.push(uow.chain(row.chain_root()).await?);
        }
    }
    Ok(chains)
}

async fn soft_delete_in(
    uow: &mut dyn UnitOfWork,
    upload_ids: &[Uuid],
) -> Result<(u64, i64), AppError> {
    let mut count = 0u64;
    let mut released = 0i64;
    for chain in chains_of(uow, upload_ids).await? {
        for row in chain.iter().filter(|f| f.is_active()) {
            uow.set_lifecycle(row.upload_id, LifecycleState::Trashed)
                .await?;
            released += row.size_bytes;
            count += 1;
        }
    }
    quota::apply_delta(uow, -released).await?;
    Ok((count, released))
}

async fn restore_from_trash_in(
    uow: &mut dyn UnitOfWork,
    upload_ids: &[Uuid],
) -> Result<(u64, i64), AppError> {
    let mut count = 0u64;
    let mut restored = 0i64;
    for chain in chains_of(uow, upload_ids).await? {
        let trashed: Vec<&LogicalFile> = chain
            .iter()
            .filter(|f| f.lifecycle_state == LifecycleState::Trashed)
            .collect();
        let Some(head) = chain.iter().find(|f| f.is_latest).or(chain.last()) else {
            continue;
        };
        if trashed.is_empty() {
            continue;
        }

        if let Some(occupant) = uow
            .find_latest_by_name(head.folder_id, &head.file_name)
            .await?
        {
            if occupant.chain_root() != head.chain_root() {
                return Err(AppError::NameConflict(format!(
                    "An active file named {} already exists in this folder",
                    head.file_name
                )));
            }
        }

        let bytes: i64 = trashed.iter().map(|f| f.size_bytes).sum();
        quota::check_capacity(uow, bytes).await?;
        for row in &trashed {
            uow.set_lifecycle(row.upload_id, LifecycleState::Active)
                .await?;
        }
        quota::apply_delta(uow, bytes).await?;
        restored += bytes;
        count += trashed.len() as u64;
    }
    Ok((count, restored))
}

async fn purge_in(
    uow: &mut dyn UnitOfWork,
    upload_ids: &[Uuid],
) -> Result<(u64, Vec<StoredBlob>), AppError> {
    let mut removed = Vec::new();
    let mut released = 0i64;
    for chain in chains_of(uow, upload_ids).await? {
        for row in chain {
            uow.delete(row.upload_id).await?;
            if row.is_active() {
                released += row.size_bytes;
            }
            removed.push(row);
        }
    }
    quota::apply_delta(uow, -released).await?;
    let garbage = collect_garbage(uow, &removed).await?;
    Ok((removed.len() as u64, garbage))
}

/// Rename and/or move a whole chain, refusing to collide with another active chain.
async fn relocate_in(
    uow: &mut dyn UnitOfWork,
    upload_id: Uuid,
    new_name: Option<&str>,
    new_folder: Option<Option<Uuid>>,
) -> Result<LogicalFile, AppError> {
    let row = uow
        .get_for_update(upload_id)
        .await?
        .ok_or_else(|| file_not_found(upload_id))?;
    let chain = uow.chain(row.chain_root()).await?;
    let mut head = chain
        .iter()
        .find(|f| f.is_latest)
        .cloned()
        .unwrap_or(row);

    let file_name = new_name.unwrap_or(head.file_name.as_str()).to_string();
    let folder_id = new_folder.unwrap_or(head.folder_id);
    if file_name == head.file_name && folder_id == head.folder_id {
        return Ok(head);
    }

    if head.is_active() {
        if let Some(occupant) = uow.find_latest_by_name(folder_id, &file_name).await? {
            if occupant.chain_root() != head.chain_root() {
                return Err(AppError::NameConflict(format!(
                    "An active file named {} already exists in the destination folder",
                    file_name
                )));
            }
        }
    }

    for version in &chain {
        uow.set_name_and_folder(version.upload_id, &file_name, folder_id)
            .await?;
    }
    tracing::info!(
        upload_id = %head.upload_id,
        file_name = %file_name,
        folder_id = ?folder_id,
        versions = chain.len(),
        "File relocated"
    );
    head.file_name = file_name;
    head.folder_id = folder_id;
    Ok(head)
}
