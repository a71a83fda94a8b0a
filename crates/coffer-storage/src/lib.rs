//! Coffer Storage Library
//!
//! Blob Store abstraction over the local filesystem and S3-compatible object
//! stores, plus the router that resolves a catalog row's backend to its store.
//!
//! # Key format
//!
//! Blob keys are tenant-scoped and opaque to callers:
//!
//! - **Blobs**: `blobs/{tenant_id}/{uuid}.{ext}`
//! - **Thumbnails**: `thumbnails/{tenant_id}/{upload_id}.jpg`
//!
//! Keys must not contain `..` or a leading `/`. Key generation lives in the `keys`
//! module so every backend lays objects out the same way.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod router;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use coffer_core::StorageBackend;
pub use factory::{create_router, create_storage};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use router::StorageRouter;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{BlobReader, BlobStore, BlobStream, StorageError, StorageResult};
