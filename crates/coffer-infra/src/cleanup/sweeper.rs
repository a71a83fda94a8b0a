use std::sync::Arc;
use std::time::Duration;

use coffer_core::Config;
use coffer_engine::ChunkAssembler;
use tokio::time::interval;

/// Periodically removes chunk staging sessions nobody has touched within the TTL.
#[derive(Clone)]
pub struct StagingSweeper {
    assembler: Arc<ChunkAssembler>,
    session_ttl: Duration,
    period: Duration,
}

impl StagingSweeper {
    pub fn new(assembler: Arc<ChunkAssembler>, session_ttl: Duration, period: Duration) -> Self {
        Self {
            assembler,
            session_ttl,
            period,
        }
    }

    /// Sweeps every tenth of the session TTL, at least once a minute.
    pub fn from_config(assembler: Arc<ChunkAssembler>, config: &Config) -> Self {
        let session_ttl = Duration::from_secs(config.staging_session_ttl_secs());
        let period = (session_ttl / 10).max(Duration::from_secs(60));
        Self::new(assembler, session_ttl, period)
    }

    /// Start the background sweep loop.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.period);

            loop {
                sweep_interval.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::error!(error = %e, "Staging sweep failed");
                }
            }
        })
    }

    #[tracing::instrument(skip(self), fields(cleanup.operation = "staging"))]
    pub async fn sweep_once(&self) -> Result<usize, anyhow::Error> {
        let removed = self.assembler.sweep_stale(self.session_ttl).await?;
        if removed > 0 {
            tracing::info!(removed, "Removed abandoned upload sessions");
        }
        Ok(removed)
    }
}
