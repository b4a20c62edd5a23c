//! Core error types for classbell-core.
//!
//! Recoverable anomalies (a malformed timetable entry, one rejected reminder)
//! never surface here; they are recorded in the summaries returned by the
//! normalizer and the reminder scheduler. These types cover the failures a
//! caller has to react to.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for classbell-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The timetable source could not deliver a payload
    #[error("Timetable source error: {0}")]
    Source(#[from] SourceError),

    /// The notification service rejected a whole reconciliation pass
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Reload orchestration errors
    #[error("Reload error: {0}")]
    Reload(#[from] ReloadError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt stored value for '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors raised while fetching the raw timetable payload.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The request never produced a response
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// The response body was not JSON
    #[error("Response from {endpoint} is not valid JSON: {message}")]
    Decode { endpoint: String, message: String },

    /// No credential configured for an authenticated source
    #[error("No bearer credential available for {endpoint}")]
    MissingCredential { endpoint: String },

    /// A local payload file could not be read
    #[error("Failed to read timetable file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a notification service.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Scheduling a single reminder was rejected
    #[error("Scheduling '{identifier}' failed: {message}")]
    ScheduleRejected { identifier: String, message: String },

    /// Cancelling a single reminder was rejected
    #[error("Cancelling '{identifier}' failed: {message}")]
    CancelRejected { identifier: String, message: String },

    /// The currently scheduled set could not be listed
    #[error("Listing scheduled reminders failed: {0}")]
    ListFailed(String),

    /// The backing storage of the service failed
    #[error("Reminder storage failed: {0}")]
    Storage(String),
}

/// Reload orchestration errors.
#[derive(Error, Debug)]
pub enum ReloadError {
    /// A lead time outside any sensible range was requested
    #[error("Lead time must be positive, got {0} minutes")]
    InvalidLeadTime(i64),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseLocked => {
                StoreError::Locked
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
