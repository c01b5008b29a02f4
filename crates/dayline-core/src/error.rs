//! Core error types for dayline-core.
//!
//! The schedule calculator and the recovery functions are total and never
//! return these. Errors exist at the boundaries: validating imported task
//! records, talking to the recovery store, and loading configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dayline-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Recovery store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors raised by a [`RecoveryStore`](crate::storage::RecoveryStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A persisted record exists but cannot be decoded
    #[error("Corrupt record under '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// The store is unavailable (memory store poisoned, directory missing, ...)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine where configuration lives
    #[error("Cannot determine configuration directory: {0}")]
    NoDataDir(String),
}

/// Validation errors for data entering the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A fixed task was submitted without a start time
    #[error("Task '{task_id}' is fixed but has no planned start")]
    FixedWithoutStart { task_id: String },

    /// Custom start mode without a start instant
    #[error("Schedule mode is custom_start but no custom start was given")]
    MissingCustomStart,

    /// Duration string could not be parsed
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    /// Clock time string could not be parsed
    #[error("Invalid clock time '{0}' (expected HH:MM)")]
    InvalidClockTime(String),

    /// Two tasks share an identifier
    #[error("Duplicate task id '{0}'")]
    DuplicateId(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseBusy
                    || inner.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_into_core_error() {
        let err: CoreError = StoreError::Locked.into();
        assert_eq!(err.to_string(), "Store error: Database is locked");
    }

    #[test]
    fn validation_message_names_task() {
        let err = ValidationError::FixedWithoutStart {
            task_id: "standup".into(),
        };
        assert!(err.to_string().contains("standup"));
    }

    #[test]
    fn rusqlite_no_rows_becomes_query_failed() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::QueryFailed(_)));
    }
}
