pub mod file;
pub mod tenant;

pub use file::{LifecycleState, LogicalFile, NewLogicalFile};
pub use tenant::{StorageStats, TenantStorageAccount};
