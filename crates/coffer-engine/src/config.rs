use std::time::Duration;

use coffer_core::Config;

use crate::version::VersionPolicy;

/// Settings for [`FileService`](crate::FileService).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_file_size_bytes: u64,
    pub versioning: VersionPolicy,
    pub thumbnails_enabled: bool,
    pub stats_cache_ttl: Duration,
    pub stats_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 1024 * 1024 * 1024,
            versioning: VersionPolicy::default(),
            thumbnails_enabled: true,
            stats_cache_ttl: Duration::from_secs(30),
            stats_cache_capacity: 10_000,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes(),
            versioning: VersionPolicy {
                mode: config.version_mode(),
                max_versions: config.max_file_versions(),
            },
            thumbnails_enabled: config.thumbnails_enabled(),
            stats_cache_ttl: Duration::from_secs(config.stats_cache_ttl_secs()),
            ..Self::default()
        }
    }
}
