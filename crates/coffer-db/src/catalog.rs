//! Catalog and unit-of-work traits
//!
//! A [`UnitOfWork`] holds the tenant's serialization point for its whole lifetime:
//! PostgreSQL locks the tenant's storage row, the memory catalog holds the tenant's
//! async mutex. Every quota change and every catalog mutation for that tenant happens
//! inside one, so capacity checks and version flips cannot interleave.

use async_trait::async_trait;
use coffer_core::models::{LifecycleState, LogicalFile, TenantStorageAccount};
use coffer_core::{AppError, TenantScope};
use uuid::Uuid;

/// One atomic set of catalog and quota changes for a single tenant.
///
/// Changes become visible only through [`commit`](UnitOfWork::commit). Dropping a
/// unit of work without committing discards everything it did.
#[async_trait]
pub trait UnitOfWork: Send {
    fn scope(&self) -> TenantScope;

    /// The tenant's storage account as seen by this unit of work.
    async fn account(&mut self) -> Result<TenantStorageAccount, AppError>;

    /// Add `delta_bytes` (signed) to the tenant's used-bytes counter.
    /// Fails if the counter would become negative.
    async fn apply_delta(&mut self, delta_bytes: i64) -> Result<TenantStorageAccount, AppError>;

    /// An active row of this tenant with the given content digest, if any.
    async fn find_by_digest(&mut self, content_digest: &str)
        -> Result<Option<LogicalFile>, AppError>;

    /// The active chain head named `file_name` in `folder_id`, if any.
    async fn find_latest_by_name(
        &mut self,
        folder_id: Option<Uuid>,
        file_name: &str,
    ) -> Result<Option<LogicalFile>, AppError>;

    /// Any row of this tenant by id, in any lifecycle state.
    async fn get_for_update(&mut self, upload_id: Uuid) -> Result<Option<LogicalFile>, AppError>;

    /// Every row of the chain rooted at `root_id`, ordered by version ascending.
    async fn chain(&mut self, root_id: Uuid) -> Result<Vec<LogicalFile>, AppError>;

    async fn insert(&mut self, file: &LogicalFile) -> Result<(), AppError>;

    async fn set_latest(&mut self, upload_id: Uuid, is_latest: bool) -> Result<(), AppError>;

    async fn set_lifecycle(
        &mut self,
        upload_id: Uuid,
        state: LifecycleState,
    ) -> Result<(), AppError>;

    /// Rename and/or move one row.
    async fn set_name_and_folder(
        &mut self,
        upload_id: Uuid,
        file_name: &str,
        folder_id: Option<Uuid>,
    ) -> Result<(), AppError>;

    /// Remove a row from the catalog.
    async fn delete(&mut self, upload_id: Uuid) -> Result<(), AppError>;

    /// Number of this tenant's rows (any lifecycle state) pointing at `blob_locator`.
    async fn blob_references(&mut self, blob_locator: &str) -> Result<i64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Tenant-scoped catalog access.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Open a unit of work, waiting for any other unit of work on the same tenant.
    async fn begin(&self, scope: TenantScope) -> Result<Box<dyn UnitOfWork>, AppError>;

    async fn find_file(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
    ) -> Result<Option<LogicalFile>, AppError>;

    /// Every row of the chain rooted at `root_id`, ordered by version ascending.
    async fn list_chain(
        &self,
        scope: TenantScope,
        root_id: Uuid,
    ) -> Result<Vec<LogicalFile>, AppError>;

    /// The tenant's storage account, created with the default quota on first use.
    async fn storage_account(&self, scope: TenantScope)
        -> Result<TenantStorageAccount, AppError>;

    /// Explicit quota override. `None` means unlimited.
    async fn set_quota(
        &self,
        scope: TenantScope,
        quota_bytes: Option<i64>,
    ) -> Result<TenantStorageAccount, AppError>;

    /// Record a rendered preview. Returns `false` when the row no longer exists.
    async fn set_thumbnail(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
        thumbnail_locator: &str,
    ) -> Result<bool, AppError>;

    async fn record_download(&self, scope: TenantScope, upload_id: Uuid) -> Result<(), AppError>;

    /// Active rows, across all tenants, with one of `extensions` and no preview yet.
    /// Oldest first.
    async fn files_missing_thumbnails(
        &self,
        extensions: &[String],
        limit: i64,
    ) -> Result<Vec<LogicalFile>, AppError>;
}

/// Commit `uow` when `result` is `Ok`, roll it back otherwise, and hand `result` back.
///
/// ```ignore
/// let mut uow = catalog.begin(scope).await?;
/// let result = do_work(uow.as_mut()).await;
/// let value = finish_unit_of_work(uow, result).await?;
/// ```
pub async fn finish_unit_of_work<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back unit of work");
            }
            Err(e)
        }
    }
}
