use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::{BlobStore, StorageError, StorageResult};
use crate::StorageBackend;

/// Resolves a catalog row's recorded backend to the store that holds its blob.
///
/// New content always goes to the primary store; rows written before a backend
/// switch stay readable through their original backend as long as it is registered.
#[derive(Clone)]
pub struct StorageRouter {
    primary: StorageBackend,
    stores: HashMap<StorageBackend, Arc<dyn BlobStore>>,
}

impl StorageRouter {
    pub fn new(primary: Arc<dyn BlobStore>) -> Self {
        let backend = primary.backend_type();
        let mut stores = HashMap::new();
        stores.insert(backend, primary);
        StorageRouter {
            primary: backend,
            stores,
        }
    }

    /// Register an additional (read/delete) backend.
    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.stores.entry(store.backend_type()).or_insert(store);
        self
    }

    pub fn primary_backend(&self) -> StorageBackend {
        self.primary
    }

    /// Store used for new writes.
    pub fn primary(&self) -> Arc<dyn BlobStore> {
        // `new` always registers the primary backend.
        Arc::clone(&self.stores[&self.primary])
    }

    pub fn for_backend(&self, backend: StorageBackend) -> StorageResult<Arc<dyn BlobStore>> {
        self.stores.get(&backend).cloned().ok_or_else(|| {
            StorageError::ConfigError(format!("Storage backend {} is not configured", backend))
        })
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::LocalStorage;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_router_resolves_registered_backends() {
        let dir = tempdir().unwrap();
        let local: Arc<dyn BlobStore> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let router = StorageRouter::new(local);

        assert_eq!(router.primary_backend(), StorageBackend::Local);
        assert_eq!(router.primary().backend_type(), StorageBackend::Local);
        assert!(router.for_backend(StorageBackend::Local).is_ok());
        assert!(matches!(
            router.for_backend(StorageBackend::S3),
            Err(StorageError::ConfigError(_))
        ));
    }
}
