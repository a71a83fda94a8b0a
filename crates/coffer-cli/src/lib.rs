//! Shared wiring for the `coffer` command-line tool.

use std::sync::Arc;

use anyhow::Context;
use coffer_core::Config;
use coffer_engine::{ChunkAssembler, ChunkAssemblerConfig, EngineConfig, FileService};
use coffer_processing::{MediaThumbnailRenderer, ThumbnailRenderConfig};
use coffer_worker::{ThumbnailProcessor, ThumbnailQueue, ThumbnailQueueConfig};

/// Everything a command needs, built once from configuration.
pub struct Runtime {
    pub config: Config,
    pub service: FileService,
    pub processor: Arc<ThumbnailProcessor>,
    pub thumbnails: Option<Arc<ThumbnailQueue>>,
}

impl Runtime {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let catalog = coffer_db::create_catalog(&config)
            .await
            .context("Failed to open catalog")?;
        let storage = coffer_storage::create_router(&config)
            .await
            .context("Failed to initialize storage")?;
        let assembler = Arc::new(
            ChunkAssembler::new(ChunkAssemblerConfig::from(&config))
                .await
                .context("Failed to prepare chunk staging directory")?,
        );

        let renderer = Arc::new(MediaThumbnailRenderer::new(ThumbnailRenderConfig::from(
            &config,
        )));
        let processor = Arc::new(ThumbnailProcessor::new(
            catalog.clone(),
            storage.clone(),
            renderer,
        ));
        let thumbnails = config.thumbnails_enabled().then(|| {
            Arc::new(ThumbnailQueue::new(
                processor.clone(),
                ThumbnailQueueConfig::from(&config),
            ))
        });

        let service = FileService::new(
            catalog,
            storage,
            assembler,
            thumbnails.clone(),
            EngineConfig::from(&config),
        );

        Ok(Self {
            config,
            service,
            processor,
            thumbnails,
        })
    }

    /// Let queued preview jobs finish before the process exits.
    pub async fn shutdown(&self) {
        if let Some(queue) = &self.thumbnails {
            queue.shutdown().await;
        }
    }
}

/// Human-readable byte count, binary units.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
