//! Coffer catalog
//!
//! The persistent record of logical files, their version chains and each tenant's
//! storage account. All access is tenant-scoped: reads take a [`TenantScope`] and
//! every mutation happens inside a [`UnitOfWork`] opened for one tenant.
//!
//! Two implementations are provided: [`PgCatalog`] (PostgreSQL via sqlx) and
//! [`MemoryCatalog`] (process-local, used when no database is configured and in tests).
//!
//! [`TenantScope`]: coffer_core::TenantScope

pub mod catalog;
pub mod memory;
pub mod postgres;
pub mod setup;

pub use catalog::{finish_unit_of_work, Catalog, UnitOfWork};
pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;
pub use setup::{create_catalog, setup_database};
