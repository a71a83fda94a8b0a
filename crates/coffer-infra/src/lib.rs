//! Coffer Infrastructure Library
//!
//! Process-level plumbing shared by Coffer binaries:
//! - Telemetry initialization (tracing subscriber)
//! - Background cleanup of abandoned chunk staging areas

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "cleanup")]
pub mod cleanup;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};

#[cfg(feature = "cleanup")]
pub use cleanup::StagingSweeper;
