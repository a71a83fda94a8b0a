//! Error types module
//!
//! All engine failures are unified under [`AppError`]. The variants follow the
//! storage engine's taxonomy: capacity, not-found, conflict, invalid input and
//! backend failures, plus database and internal errors.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors such as validation failures
    Debug,
    /// Recoverable issues such as quota exhaustion or lost races
    Warn,
    /// Unexpected failures
    Error,
}

/// Describes how an error should be presented to whoever invoked the engine.
pub trait ErrorMetadata {
    /// HTTP-equivalent status code, for transports that want one
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g. "CAPACITY_EXCEEDED")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same call may succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the caller
    fn suggested_action(&self) -> Option<&'static str>;

    /// Caller-facing message (may differ from the internal message)
    fn client_message(&self) -> String;

    /// Whether details must be hidden from callers
    fn is_sensitive(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage capacity exceeded: {required} bytes required, {available} bytes available")]
    CapacityExceeded { required: u64, available: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {upload_id}: chain head is now {latest_id} (version {latest_version})")]
    Conflict {
        upload_id: Uuid,
        latest_id: Uuid,
        latest_version: i32,
    },

    #[error("Name conflict: {0}")]
    NameConflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::CapacityExceeded { .. } => (
            507,
            "CAPACITY_EXCEEDED",
            false,
            Some("Free up space or raise the storage quota"),
            false,
            LogLevel::Warn,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Conflict { .. } => (
            409,
            "VERSION_CONFLICT",
            true,
            Some("Reload the version history and retry against the current version"),
            false,
            LogLevel::Warn,
        ),
        AppError::NameConflict(_) => (
            409,
            "NAME_CONFLICT",
            false,
            Some("Choose a different name or folder"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::BackendUnavailable(_) => (
            503,
            "STORAGE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::CapacityExceeded { .. } => "CapacityExceeded",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict { .. } => "Conflict",
            AppError::NameConflict(_) => "NameConflict",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::BackendUnavailable(_) => "BackendUnavailable",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including the source chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access file catalog".to_string(),
            AppError::CapacityExceeded {
                required,
                available,
            } => format!(
                "Not enough storage space: {} bytes needed, {} bytes available",
                required, available
            ),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Conflict {
                latest_id,
                latest_version,
                ..
            } => format!(
                "File was changed concurrently; current version is {} ({})",
                latest_version, latest_id
            ),
            AppError::NameConflict(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::BackendUnavailable(_) => "Failed to access storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_capacity_exceeded() {
        let err = AppError::CapacityExceeded {
            required: 10_485_760,
            available: 5_242_880,
        };
        assert_eq!(err.http_status_code(), 507);
        assert_eq!(err.error_code(), "CAPACITY_EXCEEDED");
        assert!(!err.is_recoverable());
        assert!(err.client_message().contains("10485760"));
        assert!(err.client_message().contains("5242880"));
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_error_metadata_conflict_names_current_version() {
        let latest = Uuid::new_v4();
        let err = AppError::Conflict {
            upload_id: Uuid::new_v4(),
            latest_id: latest,
            latest_version: 4,
        };
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(err.error_code(), "VERSION_CONFLICT");
        assert!(err.client_message().contains(&latest.to_string()));
        assert!(err.client_message().contains('4'));
    }

    #[test]
    fn test_backend_errors_are_generic_for_clients() {
        let err = AppError::BackendUnavailable("s3://bucket/blobs/x: connection reset".to_string());
        assert_eq!(err.client_message(), "Failed to access storage");
        assert!(err.is_sensitive());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_metadata_not_found() {
        let err = AppError::NotFound("Upload session not found".to_string());
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "Upload session not found");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let source = anyhow::anyhow!("disk full").context("writing chunk 3");
        let err = AppError::from(source);
        let details = err.detailed_message();
        assert!(details.contains("writing chunk 3"));
    }
}
