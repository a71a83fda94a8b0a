//! Catalog construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use coffer_core::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::{Catalog, MemoryCatalog, PgCatalog};

/// Connect the PostgreSQL pool.
pub async fn setup_database(config: &Config, database_url: &str) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    Ok(pool)
}

/// PostgreSQL catalog (migrated) when `DATABASE_URL` is set, in-memory otherwise.
pub async fn create_catalog(config: &Config) -> Result<Arc<dyn Catalog>> {
    match config.database_url() {
        Some(url) => {
            let pool = setup_database(config, url).await?;
            let catalog = PgCatalog::new(pool, config.default_tenant_quota_bytes());
            catalog
                .migrate()
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Catalog migrations applied");
            Ok(Arc::new(catalog))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory catalog (state is not persisted)");
            Ok(Arc::new(MemoryCatalog::new(
                config.default_tenant_quota_bytes(),
            )))
        }
    }
}
