//! Error types for rowpipe.
//!
//! Library crates use [`RowpipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::RejectReason;

/// Top-level error type for all rowpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum RowpipeError {
    /// The batch source object could not be read or decoded. Fatal for the batch.
    #[error("source unavailable ({locator}): {message}")]
    SourceUnavailable { locator: String, message: String },

    /// The batch source object does not exist.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// A row or payload failed structural validation.
    #[error("rejected: {reason}")]
    RowRejected { reason: RejectReason, message: String },

    /// The API body could not be interpreted as a key-value structure.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The Store Gateway refused or failed to persist a record.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// The Notifier failed to publish. Never propagated past the orchestrators.
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database setup or query error (open, migrate, scan).
    #[error("storage error: {0}")]
    Storage(String),

    /// Network/HTTP error talking to an external collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error outside of row validation (patches, locators).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RowpipeError>;

impl RowpipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a row rejection with a human-readable explanation.
    pub fn rejected(reason: RejectReason, msg: impl Into<String>) -> Self {
        Self::RowRejected {
            reason,
            message: msg.into(),
        }
    }

    /// Create a source-unavailable error for a locator.
    pub fn source_unavailable(locator: impl ToString, msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            locator: locator.to_string(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable kind tag for logs and notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } | Self::SourceNotFound(_) => "source_unavailable",
            Self::RowRejected { .. } => "row_rejected",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::NotificationFailed(_) => "notification_failed",
            Self::Config { .. } => "config",
            Self::Storage(_) => "storage",
            Self::Network(_) => "network",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RowpipeError::config("missing store endpoint");
        assert_eq!(err.to_string(), "config error: missing store endpoint");

        let err = RowpipeError::source_unavailable("uploads/items.csv", "connection reset");
        assert!(err.to_string().contains("uploads/items.csv"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn rejection_displays_reason_tag() {
        let err = RowpipeError::rejected(RejectReason::MissingIdentity, "row 3 has no id");
        assert_eq!(err.to_string(), "rejected: missing_identity");
        assert_eq!(err.kind(), "row_rejected");
    }

    #[test]
    fn not_found_shares_source_kind() {
        let err = RowpipeError::SourceNotFound("uploads/missing.csv".into());
        assert_eq!(err.kind(), "source_unavailable");
    }
}
