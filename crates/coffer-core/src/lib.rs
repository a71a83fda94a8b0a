//! Coffer Core Library
//!
//! Domain models, error types, configuration and the tenant scope shared by every
//! Coffer crate.

pub mod config;
pub mod error;
pub mod models;
pub mod scope;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, CofferConfig, VersionMode};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use scope::TenantScope;
pub use storage_types::StorageBackend;
