//! PostgreSQL catalog.
//!
//! A unit of work is one database transaction that starts by locking the tenant's
//! `tenant_storage` row (`SELECT ... FOR UPDATE`). Concurrent units of work for the
//! same tenant queue on that lock; other tenants are unaffected.

use async_trait::async_trait;
use coffer_core::models::{LifecycleState, LogicalFile, TenantStorageAccount};
use coffer_core::{AppError, TenantScope};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::catalog::{Catalog, UnitOfWork};

const FILE_COLUMNS: &str = r#"
    upload_id, tenant_id, file_name, blob_locator, folder_id, extension, size_bytes,
    mime_type, storage_backend, content_digest, thumbnail_locator, version_number,
    parent_file_id, is_latest, download_count, lifecycle_state, created_at, updated_at
"#;

/// PostgreSQL-backed [`Catalog`].
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
    default_quota_bytes: Option<i64>,
}

impl PgCatalog {
    pub fn new(pool: PgPool, default_quota_bytes: Option<i64>) -> Self {
        Self {
            pool,
            default_quota_bytes,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to run catalog migrations: {}", e)))
    }
}

async fn ensure_account(
    conn: &mut sqlx::PgConnection,
    tenant_id: Uuid,
    default_quota_bytes: Option<i64>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO tenant_storage (tenant_id, quota_bytes, used_bytes)
        VALUES ($1, $2, 0)
        ON CONFLICT (tenant_id) DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(default_quota_bytes)
    .execute(conn)
    .await?;
    Ok(())
}

/// One tenant-locked transaction.
pub struct PgUnitOfWork {
    scope: TenantScope,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn scope(&self) -> TenantScope {
        self.scope
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenant_storage"))]
    async fn account(&mut self) -> Result<TenantStorageAccount, AppError> {
        let account = sqlx::query_as::<Postgres, TenantStorageAccount>(
            r#"
            SELECT tenant_id, quota_bytes, used_bytes, updated_at
            FROM tenant_storage
            WHERE tenant_id = $1
            "#,
        )
        .bind(self.scope.tenant_id())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(account)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenant_storage", db.operation = "update"))]
    async fn apply_delta(&mut self, delta_bytes: i64) -> Result<TenantStorageAccount, AppError> {
        let account = sqlx::query_as::<Postgres, TenantStorageAccount>(
            r#"
            UPDATE tenant_storage
            SET used_bytes = used_bytes + $2, updated_at = NOW()
            WHERE tenant_id = $1 AND used_bytes + $2 >= 0
            RETURNING tenant_id, quota_bytes, used_bytes, updated_at
            "#,
        )
        .bind(self.scope.tenant_id())
        .bind(delta_bytes)
        .fetch_optional(&mut *self.tx)
        .await?;

        account.ok_or_else(|| {
            AppError::Internal(format!(
                "Storage counter for tenant {} would become negative (delta {})",
                self.scope, delta_bytes
            ))
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "files"))]
    async fn find_by_digest(
        &mut self,
        content_digest: &str,
    ) -> Result<Option<LogicalFile>, AppError> {
        let sql = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE tenant_id = $1 AND content_digest = $2 AND lifecycle_state = 'active'
            ORDER BY created_at ASC
            LIMIT 1
            "#
        );
        let file = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(self.scope.tenant_id())
            .bind(content_digest)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files"))]
    async fn find_latest_by_name(
        &mut self,
        folder_id: Option<Uuid>,
        file_name: &str,
    ) -> Result<Option<LogicalFile>, AppError> {
        let sql = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE tenant_id = $1
                AND folder_id IS NOT DISTINCT FROM $2
                AND file_name = $3
                AND is_latest
                AND lifecycle_state = 'active'
            LIMIT 1
            FOR UPDATE
            "#
        );
        let file = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(self.scope.tenant_id())
            .bind(folder_id)
            .bind(file_name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.record_id = %upload_id))]
    async fn get_for_update(&mut self, upload_id: Uuid) -> Result<Option<LogicalFile>, AppError> {
        let sql = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE tenant_id = $1 AND upload_id = $2
            FOR UPDATE
            "#
        );
        let file = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(self.scope.tenant_id())
            .bind(upload_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files"))]
    async fn chain(&mut self, root_id: Uuid) -> Result<Vec<LogicalFile>, AppError> {
        let sql = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE tenant_id = $1 AND (upload_id = $2 OR parent_file_id = $2)
            ORDER BY version_number ASC
            FOR UPDATE
            "#
        );
        let rows = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(self.scope.tenant_id())
            .bind(root_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self, file), fields(db.table = "files", db.operation = "insert", upload_id = %file.upload_id))]
    async fn insert(&mut self, file: &LogicalFile) -> Result<(), AppError> {
        if file.tenant_id != self.scope.tenant_id() {
            return Err(AppError::Internal(format!(
                "Row {} belongs to tenant {}, not {}",
                file.upload_id, file.tenant_id, self.scope
            )));
        }
        sqlx::query(
            r#"
            INSERT INTO files (
                upload_id, tenant_id, file_name, blob_locator, folder_id, extension,
                size_bytes, mime_type, storage_backend, content_digest, thumbnail_locator,
                version_number, parent_file_id, is_latest, download_count, lifecycle_state,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(file.upload_id)
        .bind(file.tenant_id)
        .bind(&file.file_name)
        .bind(&file.blob_locator)
        .bind(file.folder_id)
        .bind(&file.extension)
        .bind(file.size_bytes)
        .bind(&file.mime_type)
        .bind(file.storage_backend)
        .bind(&file.content_digest)
        .bind(&file.thumbnail_locator)
        .bind(file.version_number)
        .bind(file.parent_file_id)
        .bind(file.is_latest)
        .bind(file.download_count)
        .bind(file.lifecycle_state)
        .bind(file.created_at)
        .bind(file.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn set_latest(&mut self, upload_id: Uuid, is_latest: bool) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files SET is_latest = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND upload_id = $2
            "#,
        )
        .bind(self.scope.tenant_id())
        .bind(upload_id)
        .bind(is_latest)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), upload_id)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn set_lifecycle(
        &mut self,
        upload_id: Uuid,
        state: LifecycleState,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files SET lifecycle_state = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND upload_id = $2
            "#,
        )
        .bind(self.scope.tenant_id())
        .bind(upload_id)
        .bind(state)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), upload_id)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn set_name_and_folder(
        &mut self,
        upload_id: Uuid,
        file_name: &str,
        folder_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files SET file_name = $3, folder_id = $4, updated_at = NOW()
            WHERE tenant_id = $1 AND upload_id = $2
            "#,
        )
        .bind(self.scope.tenant_id())
        .bind(upload_id)
        .bind(file_name)
        .bind(folder_id)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), upload_id)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "delete"))]
    async fn delete(&mut self, upload_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM files WHERE tenant_id = $1 AND upload_id = $2")
            .bind(self.scope.tenant_id())
            .bind(upload_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "files"))]
    async fn blob_references(&mut self, blob_locator: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE tenant_id = $1 AND blob_locator = $2",
        )
        .bind(self.scope.tenant_id())
        .bind(blob_locator)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn expect_one_row(rows_affected: u64, upload_id: Uuid) -> Result<(), AppError> {
    if rows_affected == 0 {
        return Err(AppError::NotFound(format!("File {} not found", upload_id)));
    }
    Ok(())
}

#[async_trait]
impl Catalog for PgCatalog {
    #[tracing::instrument(skip(self), fields(db.table = "tenant_storage", tenant_id = %scope))]
    async fn begin(&self, scope: TenantScope) -> Result<Box<dyn UnitOfWork>, AppError> {
        let mut tx = self.pool.begin().await?;

        ensure_account(&mut *tx, scope.tenant_id(), self.default_quota_bytes).await?;

        // Tenant serialization point, held until commit or rollback.
        sqlx::query("SELECT tenant_id FROM tenant_storage WHERE tenant_id = $1 FOR UPDATE")
            .bind(scope.tenant_id())
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgUnitOfWork { scope, tx }))
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", tenant_id = %scope, db.record_id = %upload_id))]
    async fn find_file(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
    ) -> Result<Option<LogicalFile>, AppError> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE tenant_id = $1 AND upload_id = $2");
        let file = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(scope.tenant_id())
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", tenant_id = %scope))]
    async fn list_chain(
        &self,
        scope: TenantScope,
        root_id: Uuid,
    ) -> Result<Vec<LogicalFile>, AppError> {
        let sql = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE tenant_id = $1 AND (upload_id = $2 OR parent_file_id = $2)
            ORDER BY version_number ASC
            "#
        );
        let rows = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(scope.tenant_id())
            .bind(root_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenant_storage", tenant_id = %scope))]
    async fn storage_account(
        &self,
        scope: TenantScope,
    ) -> Result<TenantStorageAccount, AppError> {
        let mut conn = self.pool.acquire().await?;
        ensure_account(&mut *conn, scope.tenant_id(), self.default_quota_bytes).await?;
        let account = sqlx::query_as::<Postgres, TenantStorageAccount>(
            "SELECT tenant_id, quota_bytes, used_bytes, updated_at FROM tenant_storage WHERE tenant_id = $1",
        )
        .bind(scope.tenant_id())
        .fetch_one(&mut *conn)
        .await?;
        Ok(account)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tenant_storage", db.operation = "update", tenant_id = %scope))]
    async fn set_quota(
        &self,
        scope: TenantScope,
        quota_bytes: Option<i64>,
    ) -> Result<TenantStorageAccount, AppError> {
        let account = sqlx::query_as::<Postgres, TenantStorageAccount>(
            r#"
            INSERT INTO tenant_storage (tenant_id, quota_bytes, used_bytes)
            VALUES ($1, $2, 0)
            ON CONFLICT (tenant_id) DO UPDATE SET quota_bytes = EXCLUDED.quota_bytes, updated_at = NOW()
            RETURNING tenant_id, quota_bytes, used_bytes, updated_at
            "#,
        )
        .bind(scope.tenant_id())
        .bind(quota_bytes)
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", tenant_id = %scope))]
    async fn set_thumbnail(
        &self,
        scope: TenantScope,
        upload_id: Uuid,
        thumbnail_locator: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files SET thumbnail_locator = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND upload_id = $2
            "#,
        )
        .bind(scope.tenant_id())
        .bind(upload_id)
        .bind(thumbnail_locator)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", tenant_id = %scope))]
    async fn record_download(&self, scope: TenantScope, upload_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE files SET download_count = download_count + 1 WHERE tenant_id = $1 AND upload_id = $2",
        )
        .bind(scope.tenant_id())
        .bind(upload_id)
        .execute(&self.pool)
        .await?;
        expect_one_row(result.rows_affected(), upload_id)
    }

    #[tracing::instrument(skip(self, extensions), fields(db.table = "files"))]
    async fn files_missing_thumbnails(
        &self,
        extensions: &[String],
        limit: i64,
    ) -> Result<Vec<LogicalFile>, AppError> {
        let lowered: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
        let sql = format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE thumbnail_locator IS NULL
                AND lifecycle_state = 'active'
                AND lower(extension) = ANY($1)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<Postgres, LogicalFile>(&sql)
            .bind(&lowered)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
