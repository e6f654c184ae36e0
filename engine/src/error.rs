//! Error types for the VibeStatus engine.
//!
//! This module defines the error types used throughout the engine crate,
//! providing structured error handling with clear, human-readable messages.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during engine operations.
///
/// Scan-level failures (unlistable directory, unreadable or malformed
/// files) are deliberately NOT represented here; per the failure semantics
/// they are swallowed into a per-cycle error counter rather than surfaced.
/// This type covers the setup and lifecycle paths.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watching error.
    ///
    /// Non-fatal at the engine level: the polling timer is the fallback when
    /// no directory watch can be established.
    #[error("file watch error: {0}")]
    Watch(String),

    /// The engine was asked to start while already running.
    #[error("engine already started")]
    AlreadyStarted,
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = EngineError::Config(ConfigError::InvalidValue {
            key: "VIBESTATUS_POLL_MS".to_string(),
            message: "expected positive integer".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "configuration error: invalid value for VIBESTATUS_POLL_MS: expected positive integer"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: EngineError = json_err.into();
        assert!(matches!(err, EngineError::Json(_)));
    }

    #[test]
    fn watch_error_display() {
        let err = EngineError::Watch("inotify limit reached".to_string());
        assert_eq!(err.to_string(), "file watch error: inotify limit reached");
    }

    #[test]
    fn already_started_display() {
        assert_eq!(
            EngineError::AlreadyStarted.to_string(),
            "engine already started"
        );
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: EngineError = io_err.into();
        assert!(err.source().is_some());
    }
}
