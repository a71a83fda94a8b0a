//! Thumbnail queue: bounded channel, worker pool, retry with backoff.
//!
//! Shutdown: [`ThumbnailQueue::shutdown`] stops accepting jobs, lets the pool finish
//! whatever is already queued or running, and returns once the pool is idle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use coffer_core::Config;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::processor::{ThumbnailJob, ThumbnailOutcome, ThumbnailProcessor};

/// Upper bound on the delay between two attempts of the same job.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Delay after failed attempt number `attempt` (0-based): `base * 2^attempt`, capped.
#[inline]
pub fn compute_retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_RETRY_BACKOFF)
}

#[derive(Debug, Clone)]
pub struct ThumbnailQueueConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// Per-attempt limit; an attempt that runs longer counts as failed.
    pub attempt_timeout: Duration,
}

impl Default for ThumbnailQueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_size: 1000,
            max_attempts: 3,
            base_backoff: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for ThumbnailQueueConfig {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.thumbnail_workers(),
            queue_size: config.thumbnail_queue_size(),
            max_attempts: config.thumbnail_max_attempts(),
            base_backoff: Duration::from_millis(config.thumbnail_backoff_ms()),
            attempt_timeout: Duration::from_secs(config.thumbnail_timeout_secs()),
        }
    }
}

pub struct ThumbnailQueue {
    tx: mpsc::Sender<ThumbnailJob>,
    shutdown_tx: mpsc::Sender<()>,
    pool: Mutex<Option<JoinHandle<()>>>,
}

impl ThumbnailQueue {
    /// Start the worker pool. Must be called inside a Tokio runtime.
    pub fn new(processor: Arc<ThumbnailProcessor>, config: ThumbnailQueueConfig) -> Self {
        let queue_size = config.queue_size.max(1);
        let (tx, rx) = mpsc::channel(queue_size);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tracing::info!(
            queue_size = queue_size,
            workers = config.workers,
            max_attempts = config.max_attempts,
            "Thumbnail queue initialized"
        );

        let pool = tokio::spawn(Self::worker_pool(rx, shutdown_rx, processor, config));

        Self {
            tx,
            shutdown_tx,
            pool: Mutex::new(Some(pool)),
        }
    }

    /// Queue a job without waiting. Returns `false` (and logs) when the queue is
    /// full or shut down; the row then waits for a backfill run.
    #[tracing::instrument(skip(self, job), fields(job.type = "thumbnail", upload_id = %job.upload_id))]
    pub fn enqueue(&self, job: ThumbnailJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    upload_id = %job.upload_id,
                    "Thumbnail queue is full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    upload_id = %job.upload_id,
                    "Thumbnail queue is shut down, dropping job"
                );
                false
            }
        }
    }

    /// Stop accepting jobs, finish everything already queued or running, then return.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating thumbnail queue shutdown");
        let _ = self.shutdown_tx.try_send(());

        let handle = self
            .pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Thumbnail worker pool panicked");
            }
        }
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<ThumbnailJob>,
        mut shutdown_rx: mpsc::Receiver<()>,
        processor: Arc<ThumbnailProcessor>,
        config: ThumbnailQueueConfig,
    ) {
        let workers = config.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let config = Arc::new(config);

        loop {
            let job = tokio::select! {
                job = rx.recv() => job,
                _ = shutdown_rx.recv() => {
                    // Refuse new jobs but drain the buffered ones.
                    rx.close();
                    rx.recv().await
                }
            };
            let Some(job) = job else { break };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let processor = processor.clone();
            let config = config.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::process_with_retry(job, &processor, &config).await;
            });
        }

        // Wait for in-flight jobs.
        let _ = semaphore.acquire_many(workers as u32).await;
        tracing::info!("Thumbnail worker pool stopped");
    }

    #[tracing::instrument(skip(processor, config), fields(upload_id = %job.upload_id, tenant_id = %job.tenant_id))]
    async fn process_with_retry(
        job: ThumbnailJob,
        processor: &ThumbnailProcessor,
        config: &ThumbnailQueueConfig,
    ) -> Option<ThumbnailOutcome> {
        let max_attempts = config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match tokio::time::timeout(config.attempt_timeout, processor.process(&job)).await {
                Ok(Ok(outcome)) => return Some(outcome),
                Ok(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        "Thumbnail attempt failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        timeout_ms = config.attempt_timeout.as_millis() as u64,
                        "Thumbnail attempt timed out"
                    );
                }
            }

            if attempt + 1 < max_attempts {
                tokio::time::sleep(compute_retry_backoff(config.base_backoff, attempt)).await;
            }
        }

        tracing::error!(
            max_attempts = max_attempts,
            "Thumbnail job dropped after exhausting retries"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        let base = Duration::from_millis(1000);
        assert_eq!(compute_retry_backoff(base, 0), Duration::from_secs(1));
        assert_eq!(compute_retry_backoff(base, 1), Duration::from_secs(2));
        assert_eq!(compute_retry_backoff(base, 2), Duration::from_secs(4));
        assert_eq!(compute_retry_backoff(base, 6), MAX_RETRY_BACKOFF);
        assert_eq!(compute_retry_backoff(base, 40), MAX_RETRY_BACKOFF);
    }

    #[test]
    fn default_config_matches_pipeline_policy() {
        let config = ThumbnailQueueConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!(config.queue_size > 0);
    }
}
