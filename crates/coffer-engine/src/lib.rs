//! Coffer Engine
//!
//! Ingest (whole-file and chunked), content deduplication, per-tenant quota
//! accounting and linear version history, exposed through [`FileService`].
//!
//! Components, leaf first:
//!
//! - [`digest`]: SHA-256 content digests used as the dedup key
//! - [`chunk`]: staging and ordered merging of chunked uploads
//! - [`quota`]: capacity checks and usage deltas inside a unit of work
//! - [`version`]: create / overwrite / append decisions and retention
//! - [`cache`]: TTL cache-aside used for storage statistics
//! - [`service`]: the operations callers invoke

pub mod cache;
pub mod chunk;
pub mod config;
pub mod digest;
pub mod naming;
pub mod quota;
pub mod service;
pub mod version;

pub use cache::{cache_aside, TtlCache};
pub use chunk::{ChunkAck, ChunkAssembler, ChunkAssemblerConfig, MergedBlob};
pub use config::EngineConfig;
pub use digest::{digest, ContentHasher};
pub use service::FileService;
pub use version::{VersionPolicy, WritePlan};
