//! Process-local catalog.
//!
//! Each tenant's state sits behind its own `tokio::sync::Mutex`. A unit of work owns
//! that lock and edits a copy of the state; commit writes the copy back, drop throws
//! it away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use coffer_core::models::{LifecycleState, LogicalFile, TenantStorageAccount};
use coffer_core::{AppError, TenantScope};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::catalog::{Catalog, UnitOfWork};

#[derive(Debug, Clone)]
struct TenantState {
    account: TenantStorageAccount,
    files: HashMap<Uuid, LogicalFile>,
}

impl TenantState {
    fn chain(&self, root_id: Uuid) -> Vec<LogicalFile> {
        let mut rows: Vec<LogicalFile> = self
            .files
            .values()
            .filter(|f| f.chain_root() == root_id)
            .cloned()
            .collect();
        rows.sort_by_key(|f| f.version_number);
        rows
    }

    fn file_mut(&mut self, upload_id: Uuid) -> Result<&mut LogicalFile, AppError> {
        self.files
            .get_mut(&upload_id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", upload_id)))
    }
}

/// In-memory [`Catalog`].
pub struct MemoryCatalog {
    tenants: Mutex<HashMap<Uuid, Arc<AsyncMutex<TenantState>>>>,
    default_quota_bytes: Option<i64>,
}

impl MemoryCatalog {
    /// `default_quota_bytes` applies to tenant accounts created on first use.
    pub fn new(default_quota_bytes: Option<i64>) -> Self {
        Self {
            tenants: Mutex::new(HashMap::new()),
            default_quota_bytes,
        }
    }

    fn tenant(&self, scope: TenantScope) -> Arc<AsyncMutex<TenantState>> {
        let mut tenants = self.tenants.lock().unwrap_or_else(|e| e.into_inner());
        let default_quota = self.default_quota_bytes;
        tenants
            .entry(scope.tenant_id())
            .or_insert_with(|| {
                Arc::new(AsyncMutex::new(TenantState {
                    account: TenantStorageAccount::new(scope.tenant_id(), default_quota),
                    files: HashMap::new(),
                }))
            })
            .clone()
    }

    fn all_tenants(&self) -> Vec<Arc<AsyncMutex<TenantState>>> {
        let tenants = self.tenants.lock().unwrap_or_else(|e| e.into_inner());
        tenants.values().cloned().collect()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

struct MemoryUnitOfWork {
    scope: TenantScope,
    guard: OwnedMutexGuard<TenantState>,
    working: TenantState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn scope(&self) -> TenantScope {
        self.scope
    }

    async fn account(&mut self) -> Result<TenantStorageAccount, AppError> {
        Ok(self.working.account.clone())
    }

    async fn apply_delta(&mut self, delta_bytes: i64) -> Result<TenantStorageAccount, AppError> {
        let used = self.working.account.used_bytes + delta_bytes;
        if used < 0 {
            return Err(AppError::Internal(format!(
                "Storage counter for tenant {} would become negative ({})",
                self.scope, used
            )));
        }
        self.working.account.used_bytes = used;
        self.working.account.updated_at = Utc::now();
        Ok(self.working.account.clone())
    }

    async fn find_by_digest(
        &mut self,
        content_digest: &str,
    ) -> Result<Option<LogicalFile>, AppError> {
        Ok(self
            .working
            .files
            .values()
            .filter(|f| f.is_active() && f.content_digest == content_digest)
            .min_by_key(|f| f.created_at)
            .cloned())
    }

    async fn find_latest_by_name(
        &mut self,
        folder_id: Option<Uuid>,
        file_name: &str,
    ) -> Result<Option<LogicalFile>, AppError> {
        Ok(self
            .working
            .files
            .values()
            .find(|f| {
                f.is_active() && f.is_latest && f.folder_id == folder_id && f.file_name == file_name
            })
            .cloned())
    }

    async fn get_for_update(&mut self, upload_id: Uuid) -> Result<Option<LogicalFile>, AppError> {
        Ok(self.working.files.get(&upload_id).cloned())
    }

    async fn chain(&mut self, root_id: Uuid) -> Result<Vec<LogicalFile>, AppError> {
        Ok(self.working.chain(root_id))
    }

    async fn insert(&mut self, file: &LogicalFile) -> Result<(), AppError> {
        if file.tenant_id != self.scope.tenant_id() {
            return Err(AppError::Internal(format!(
                "Row {} belongs to tenant {}, not {}",
                file.upload_id, file.tenant_id, self.scope
            )));
        }
        let root = file.chain_root();
        let clash = self.working.files.values().any(|f| {
            f.chain_root() == root
                && (f.version_number == file.version_number || (f.is_latest && file.is_latest))
        });
        if clash || self.working.files.contains_key(&file.upload_id) {
            return Err(AppError::Internal(format!(
                "Duplicate version {} in chain {}",
                file.version_number, root
            )));
        }
        self.working.files.insert(file.upload_id, file.clone());
        Ok(())
    }

    async fn set_latest(&mut self, upload_id: Uuid, is_latest: bool) -> Result<(), AppError> {
        let file = self.working.file_mut(upload_id)?;
        file.is_latest = is_latest;
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn set_lifecycle(
        &mut self,
        upload_id: Uuid,
        state: LifecycleState,
    ) -> Result<(), AppError> {
        let file = self.working.file_mut(upload_id)?;
        file.lifecycle_state = state;
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn set_name_and_folder(
        &mut self,
        upload_id: Uuid,
        file_name: &str,
        folder_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let file = self.working.file_mut(upload_id)?;
        file.file_name = file_name.to_string();
        file.folder_id = folder_id;
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&mut self, upload_id: Uuid) -> Result<(), AppError> {
        self.working.files.remove(&upload_id);
        Ok(())
    }

    async fn blob_references(&mut self, blob_locator: &str) -> Result<i64, AppError> {
        Ok(self
            .working
            .files
            .values()
            .filter(|f| f.blob_locator == blob_locator)
            .count() as i64)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn begin(&self, scope: TenantScope) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.tenant(scope).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            scope,
            guard,
            working,
        }))
    }

    async fn find_file(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
    ) -> Result<Option<LogicalFile>, AppError> {
        let tenant = self.tenant(scope);
        let state = tenant.lock().await;
        Ok(state.files.get(&upload_id).cloned())
    }

    async fn list_chain(
        &self,
        scope: TenantScope,
        root_id: Uuid,
    ) -> Result<Vec<LogicalFile>, AppError> {
        let tenant = self.tenant(scope);
        let state = tenant.lock().await;
        Ok(state.chain(root_id))
    }

    async fn storage_account(
        &self,
        scope: TenantScope,
    ) -> Result<TenantStorageAccount, AppError> {
        let tenant = self.tenant(scope);
        let state = tenant.lock().await;
        Ok(state.account.clone())
    }

    async fn set_quota(
        &self,
        scope: TenantScope,
        quota_bytes: Option<i64>,
    ) -> Result<TenantStorageAccount, AppError> {
        let tenant = self.tenant(scope);
        let mut state = tenant.lock().await;
        state.account.quota_bytes = quota_bytes;
        state.account.updated_at = Utc::now();
        Ok(state.account.clone())
    }

    async fn set_thumbnail(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
        thumbnail_locator: &str,
    ) -> Result<bool, AppError> {
        let tenant = self.tenant(scope);
        let mut state = tenant.lock().await;
        match state.files.get_mut(&upload_id) {
            Some(file) => {
                file.thumbnail_locator = Some(thumbnail_locator.to_string());
                file.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_download(&self, scope: TenantScope, upload_id: Uuid) -> Result<(), AppError> {
        let tenant = self.tenant(scope);
        let mut state = tenant.lock().await;
        let file = state.file_mut(upload_id)?;
        file.download_count += 1;
        Ok(())
    }

    async fn files_missing_thumbnails(
        &self,
        extensions: &[String],
        limit: i64,
    ) -> Result<Vec<LogicalFile>, AppError> {
        let mut rows = Vec::new();
        for tenant in self.all_tenants() {
            let state = tenant.lock().await;
            rows.extend(
                state
                    .files
                    .values()
                    .filter(|f| {
                        f.is_active()
                            && f.thumbnail_locator.is_none()
                            && extensions.iter().any(|e| e.eq_ignore_ascii_case(&f.extension))
                    })
                    .cloned(),
            );
        }
        rows.sort_by_key(|f| f.created_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
