use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage_types::StorageBackend;

/// Lifecycle of a catalog row. `Purged` rows are removed from the catalog, so the
/// state is only ever observed transiently (e.g. in log fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "lifecycle_state", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Trashed,
    Purged,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Trashed => write!(f, "trashed"),
            LifecycleState::Purged => write!(f, "purged"),
        }
    }
}

/// A logical file: one version row in a version chain.
///
/// The chain root is the first version; every later version points at the root
/// through `parent_file_id`, never at its immediate predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LogicalFile {
    pub upload_id: Uuid,
    pub tenant_id: Uuid,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub blob_locator: String,
    pub folder_id: Option<Uuid>,
    pub extension: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub storage_backend: StorageBackend,
    pub content_digest: String,
    #[serde(skip_serializing)]
    pub thumbnail_locator: Option<String>,
    pub version_number: i32,
    pub parent_file_id: Option<Uuid>,
    pub is_latest: bool,
    pub download_count: i64,
    pub lifecycle_state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogicalFile {
    /// Id of the first version of this row's chain.
    pub fn chain_root(&self) -> Uuid {
        self.parent_file_id.unwrap_or(self.upload_id)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle_state == LifecycleState::Active
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_locator.is_some()
    }
}

/// Everything needed to insert a new version row; ids, timestamps and counters are
/// assigned by [`NewLogicalFile::into_row`].
#[derive(Debug, Clone)]
pub struct NewLogicalFile {
    pub file_name: String,
    pub blob_locator: String,
    pub folder_id: Option<Uuid>,
    pub extension: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub storage_backend: StorageBackend,
    pub content_digest: String,
}

impl NewLogicalFile {
    /// Materialise an active row. `parent_file_id` must be the chain root for any
    /// version after the first.
    pub fn into_row(
        self,
        tenant_id: Uuid,
        version_number: i32,
        parent_file_id: Option<Uuid>,
    ) -> LogicalFile {
        let now = Utc::now();
        LogicalFile {
            upload_id: Uuid::new_v4(),
            tenant_id,
            file_name: self.file_name,
            blob_locator: self.blob_locator,
            folder_id: self.folder_id,
            extension: self.extension,
            size_bytes: self.size_bytes,
            mime_type: self.mime_type,
            storage_backend: self.storage_backend,
            content_digest: self.content_digest,
            thumbnail_locator: None,
            version_number,
            parent_file_id,
            is_latest: true,
            download_count: 0,
            lifecycle_state: LifecycleState::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&LogicalFile> for NewLogicalFile {
    /// Copy a row's content forward (same blob, digest and name) for a new version.
    fn from(file: &LogicalFile) -> Self {
        NewLogicalFile {
            file_name: file.file_name.clone(),
            blob_locator: file.blob_locator.clone(),
            folder_id: file.folder_id,
            extension: file.extension.clone(),
            size_bytes: file.size_bytes,
            mime_type: file.mime_type.clone(),
            storage_backend: file.storage_backend,
            content_digest: file.content_digest.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file() -> NewLogicalFile {
        NewLogicalFile {
            file_name: "report.pdf".to_string(),
            blob_locator: "blobs/t/abc.pdf".to_string(),
            folder_id: None,
            extension: "pdf".to_string(),
            size_bytes: 42,
            mime_type: "application/pdf".to_string(),
            storage_backend: StorageBackend::Local,
            content_digest: "deadbeef".to_string(),
        }
    }

    #[test]
    fn test_first_version_is_its_own_chain_root() {
        let row = new_file().into_row(Uuid::new_v4(), 1, None);
        assert_eq!(row.chain_root(), row.upload_id);
        assert!(row.is_latest);
        assert!(row.is_active());
        assert_eq!(row.download_count, 0);
    }

    #[test]
    fn test_later_version_points_at_root() {
        let tenant = Uuid::new_v4();
        let root = new_file().into_row(tenant, 1, None);
        let v2 = NewLogicalFile::from(&root).into_row(tenant, 2, Some(root.chain_root()));
        assert_eq!(v2.chain_root(), root.upload_id);
        assert_ne!(v2.upload_id, root.upload_id);
        assert_eq!(v2.blob_locator, root.blob_locator);
    }

    #[test]
    fn test_locators_are_not_serialized() {
        let row = new_file().into_row(Uuid::new_v4(), 1, None);
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("blob_locator").is_none());
        assert!(json.get("thumbnail_locator").is_none());
        assert_eq!(json["lifecycle_state"], "active");
    }
}
