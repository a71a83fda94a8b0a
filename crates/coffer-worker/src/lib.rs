//! Coffer background work
//!
//! The thumbnail pipeline: a bounded in-process queue drained by a worker pool.
//! Jobs are retried with exponential backoff and dropped after the last attempt;
//! a missing preview never affects the file it belongs to. Rows whose preview was
//! never written stay discoverable through
//! [`Catalog::files_missing_thumbnails`](coffer_db::Catalog::files_missing_thumbnails).

pub mod processor;
pub mod queue;

pub use processor::{ThumbnailJob, ThumbnailOutcome, ThumbnailProcessor};
pub use queue::{compute_retry_backoff, ThumbnailQueue, ThumbnailQueueConfig};
