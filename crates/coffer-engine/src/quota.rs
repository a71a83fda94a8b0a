//! Quota Accountant
//!
//! Both operations run inside a [`UnitOfWork`], which already serializes the
//! tenant; a capacity check and the delta that follows it cannot interleave with
//! another writer on the same tenant.

use coffer_core::models::TenantStorageAccount;
use coffer_core::AppError;
use coffer_db::UnitOfWork;

/// Fail with `CapacityExceeded` when adding `delta_bytes` would overrun the quota.
/// Zero and negative deltas always pass.
pub async fn check_capacity(
    uow: &mut dyn UnitOfWork,
    delta_bytes: i64,
) -> Result<TenantStorageAccount, AppError> {
    let account = uow.account().await?;
    if delta_bytes <= 0 {
        return Ok(account);
    }

    if let Some(available) = account.available_bytes() {
        let required = delta_bytes as u64;
        if required > available {
            tracing::warn!(
                tenant_id = %account.tenant_id,
                required_bytes = required,
                available_bytes = available,
                used_bytes = account.used_bytes,
                "Storage quota exceeded"
            );
            return Err(AppError::CapacityExceeded {
                required,
                available,
            });
        }
    }
    Ok(account)
}

/// Apply a signed change to the tenant's used-bytes counter.
pub async fn apply_delta(
    uow: &mut dyn UnitOfWork,
    delta_bytes: i64,
) -> Result<TenantStorageAccount, AppError> {
    if delta_bytes == 0 {
        return uow.account().await;
    }
    let account = uow.apply_delta(delta_bytes).await?;
    tracing::debug!(
        tenant_id = %account.tenant_id,
        delta_bytes,
        used_bytes = account.used_bytes,
        "Storage usage updated"
    );
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::TenantScope;
    use coffer_db::{Catalog, MemoryCatalog};
    use uuid::Uuid;

    const MB: i64 = 1024 * 1024;

    #[tokio::test]
    async fn test_capacity_check_reports_required_and_available() {
        let catalog = MemoryCatalog::new(Some(100 * MB));
        let scope = TenantScope::new(Uuid::new_v4());
        let mut uow = catalog.begin(scope).await.unwrap();
        apply_delta(uow.as_mut(), 95 * MB).await.unwrap();

        let err = check_capacity(uow.as_mut(), 10 * MB).await.unwrap_err();
        match err {
            AppError::CapacityExceeded {
                required,
                available,
            } => {
                assert_eq!(required, (10 * MB) as u64);
                assert_eq!(available, (5 * MB) as u64);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(check_capacity(uow.as_mut(), 5 * MB).await.is_ok());
        assert!(check_capacity(uow.as_mut(), -20 * MB).await.is_ok());
    }

    #[tokio::test]
    async fn test_unlimited_account_always_has_capacity() {
        let catalog = MemoryCatalog::new(None);
        let mut uow = catalog.begin(TenantScope::new(Uuid::new_v4())).await.unwrap();
        assert!(check_capacity(uow.as_mut(), i64::MAX).await.is_ok());
    }

    #[tokio::test]
    async fn test_delta_is_discarded_without_commit() {
        let catalog = MemoryCatalog::new(None);
        let scope = TenantScope::new(Uuid::new_v4());

        let mut uow = catalog.begin(scope).await.unwrap();
        apply_delta(uow.as_mut(), 42).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(catalog.storage_account(scope).await.unwrap().used_bytes, 0);

        let mut uow = catalog.begin(scope).await.unwrap();
        apply_delta(uow.as_mut(), 42).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(catalog.storage_account(scope).await.unwrap().used_bytes, 42);
    }
}
