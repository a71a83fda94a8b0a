//! Configuration module
//!
//! Environment-driven configuration for the storage engine, its backends and the
//! thumbnail pipeline. `.env` files are honoured through `dotenvy`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE_MB: u64 = 1024;
const MAX_CHUNK_COUNT: u32 = 10_000;
const MAX_FILE_VERSIONS: u32 = 10;
const DEFAULT_TENANT_QUOTA_MB: u64 = 0;
const STAGING_SESSION_TTL_SECS: u64 = 86_400;
const THUMBNAIL_WIDTH: u32 = 320;
const THUMBNAIL_VIDEO_TIMESTAMP_SECS: f64 = 1.0;
const THUMBNAIL_MAX_ATTEMPTS: u32 = 3;
const THUMBNAIL_BACKOFF_MS: u64 = 1000;
const THUMBNAIL_TIMEOUT_SECS: u64 = 60;
const THUMBNAIL_WORKERS: usize = 4;
const THUMBNAIL_QUEUE_SIZE: usize = 1000;
const STATS_CACHE_TTL_SECS: u64 = 30;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// What happens when a file is uploaded under a name that already exists in the folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionMode {
    /// Append a new version to the existing chain.
    #[default]
    Version,
    /// Trash the existing chain and start a fresh one.
    Overwrite,
}

impl FromStr for VersionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "version" | "versioning" | "chain" => Ok(VersionMode::Version),
            "overwrite" | "replace" => Ok(VersionMode::Overwrite),
            other => Err(anyhow::anyhow!("Invalid FILE_VERSION_MODE: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CofferConfig {
    pub environment: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    // Ingest
    pub staging_path: PathBuf,
    pub staging_session_ttl_secs: u64,
    pub max_file_size_bytes: u64,
    pub max_chunk_count: u32,
    pub version_mode: VersionMode,
    pub max_file_versions: u32,
    pub default_tenant_quota_bytes: Option<i64>,
    // Thumbnails
    pub thumbnails_enabled: bool,
    pub thumbnail_width: u32,
    pub thumbnail_video_timestamp_secs: f64,
    pub ffmpeg_path: String,
    pub thumbnail_max_attempts: u32,
    pub thumbnail_backoff_ms: u64,
    pub thumbnail_timeout_secs: u64,
    pub thumbnail_workers: usize,
    pub thumbnail_queue_size: usize,
    pub stats_cache_ttl_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<CofferConfig>);

impl Config {
    fn inner(&self) -> &CofferConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = CofferConfig::from_lookup(|key| env::var(key).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn is_production(&self) -> bool {
        let env = self.inner().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().db_timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    /// `S3_REGION`, falling back to `AWS_REGION`.
    pub fn s3_region(&self) -> Option<&str> {
        self.inner()
            .s3_region
            .as_deref()
            .or(self.inner().aws_region.as_deref())
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn staging_path(&self) -> &PathBuf {
        &self.inner().staging_path
    }

    pub fn staging_session_ttl_secs(&self) -> u64 {
        self.inner().staging_session_ttl_secs
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.inner().max_file_size_bytes
    }

    pub fn max_chunk_count(&self) -> u32 {
        self.inner().max_chunk_count
    }

    pub fn version_mode(&self) -> VersionMode {
        self.inner().version_mode
    }

    /// Retained active versions per chain. 0 means unlimited.
    pub fn max_file_versions(&self) -> u32 {
        self.inner().max_file_versions
    }

    pub fn default_tenant_quota_bytes(&self) -> Option<i64> {
        self.inner().default_tenant_quota_bytes
    }

    pub fn thumbnails_enabled(&self) -> bool {
        self.inner().thumbnails_enabled
    }

    pub fn thumbnail_width(&self) -> u32 {
        self.inner().thumbnail_width
    }

    pub fn thumbnail_video_timestamp_secs(&self) -> f64 {
        self.inner().thumbnail_video_timestamp_secs
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.inner().ffmpeg_path
    }

    pub fn thumbnail_max_attempts(&self) -> u32 {
        self.inner().thumbnail_max_attempts
    }

    pub fn thumbnail_backoff_ms(&self) -> u64 {
        self.inner().thumbnail_backoff_ms
    }

    pub fn thumbnail_timeout_secs(&self) -> u64 {
        self.inner().thumbnail_timeout_secs
    }

    pub fn thumbnail_workers(&self) -> usize {
        self.inner().thumbnail_workers
    }

    pub fn thumbnail_queue_size(&self) -> usize {
        self.inner().thumbnail_queue_size
    }

    pub fn stats_cache_ttl_secs(&self) -> u64 {
        self.inner().stats_cache_ttl_secs
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl CofferConfig {
    /// Build a configuration from a variable lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(get: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = get("ENVIRONMENT")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage_backend = match get("STORAGE_BACKEND") {
            Some(s) => s.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let version_mode = match get("FILE_VERSION_MODE") {
            Some(s) => s.parse::<VersionMode>()?,
            None => VersionMode::Version,
        };

        let max_file_size_mb: u64 = parse_or(get("MAX_FILE_SIZE_MB"), MAX_FILE_SIZE_MB);

        let default_quota_mb: u64 =
            parse_or(get("DEFAULT_TENANT_QUOTA_MB"), DEFAULT_TENANT_QUOTA_MB);
        let default_tenant_quota_bytes = if default_quota_mb == 0 {
            None
        } else {
            Some((default_quota_mb.saturating_mul(BYTES_PER_MB)).min(i64::MAX as u64) as i64)
        };

        let staging_path = get("STAGING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("coffer-staging"));

        let config = CofferConfig {
            environment,
            database_url: get("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(get("DB_TIMEOUT_SECONDS"), CONNECTION_TIMEOUT_SECS),
            storage_backend,
            local_storage_path: get("LOCAL_STORAGE_PATH"),
            s3_bucket: get("S3_BUCKET"),
            s3_region: get("S3_REGION"),
            s3_endpoint: get("S3_ENDPOINT"),
            aws_region: get("AWS_REGION"),
            staging_path,
            staging_session_ttl_secs: parse_or(
                get("STAGING_SESSION_TTL_SECS"),
                STAGING_SESSION_TTL_SECS,
            ),
            max_file_size_bytes: max_file_size_mb.saturating_mul(BYTES_PER_MB),
            max_chunk_count: parse_or(get("MAX_CHUNK_COUNT"), MAX_CHUNK_COUNT),
            version_mode,
            max_file_versions: parse_or(get("MAX_FILE_VERSIONS"), MAX_FILE_VERSIONS),
            default_tenant_quota_bytes,
            thumbnails_enabled: parse_or(
                get("THUMBNAILS_ENABLED").map(|s| s.to_lowercase()),
                true,
            ),
            thumbnail_width: parse_or(get("THUMBNAIL_WIDTH"), THUMBNAIL_WIDTH),
            thumbnail_video_timestamp_secs: parse_or(
                get("THUMBNAIL_VIDEO_TIMESTAMP_SECS"),
                THUMBNAIL_VIDEO_TIMESTAMP_SECS,
            ),
            ffmpeg_path: get("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            thumbnail_max_attempts: parse_or(
                get("THUMBNAIL_MAX_ATTEMPTS"),
                THUMBNAIL_MAX_ATTEMPTS,
            ),
            thumbnail_backoff_ms: parse_or(get("THUMBNAIL_BACKOFF_MS"), THUMBNAIL_BACKOFF_MS),
            thumbnail_timeout_secs: parse_or(
                get("THUMBNAIL_TIMEOUT_SECS"),
                THUMBNAIL_TIMEOUT_SECS,
            ),
            thumbnail_workers: parse_or(get("THUMBNAIL_WORKERS"), THUMBNAIL_WORKERS),
            thumbnail_queue_size: parse_or(get("THUMBNAIL_QUEUE_SIZE"), THUMBNAIL_QUEUE_SIZE),
            stats_cache_ttl_secs: parse_or(get("STATS_CACHE_TTL_SECS"), STATS_CACHE_TTL_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }
        if self.max_chunk_count == 0 {
            return Err(anyhow::anyhow!("MAX_CHUNK_COUNT must be greater than 0"));
        }
        if self.thumbnail_width == 0 {
            return Err(anyhow::anyhow!("THUMBNAIL_WIDTH must be greater than 0"));
        }
        if self.thumbnail_max_attempts == 0 {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_MAX_ATTEMPTS must be at least 1"
            ));
        }
        if self.thumbnail_workers == 0 || self.thumbnail_queue_size == 0 {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_WORKERS and THUMBNAIL_QUEUE_SIZE must be greater than 0"
            ));
        }

        Ok(())
    }
}
