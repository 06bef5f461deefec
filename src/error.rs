//! Error handling for the file bridge
//!
//! Internally every fallible operation returns [`BridgeError`]. The
//! conversion to the engine's status vocabulary happens once, at the
//! callback boundary, through [`BridgeError::status`].

use std::path::PathBuf;

use thiserror::Error;

use crate::bridge::status::FileStatus;
use crate::bridge::FileHandle;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // Resource Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Cannot open '{path}': {reason}")]
    BadFile {
        path: String,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Caller Errors
    #[error("Invalid file handle: {handle}")]
    InvalidHandle { handle: FileHandle },

    // Cancellation
    #[error("Asynchronous read was cancelled")]
    Cancelled,

    // Scheduling Errors
    #[error("Async scheduler is closed")]
    SchedulerClosed,

    #[error("Too many asynchronous reads in flight (limit {limit})")]
    TooManyInFlight { limit: usize },

    // Internal Errors
    #[error("Lock poisoned: {what}")]
    LockPoisoned { what: &'static str },

    #[error("Worker runtime error: {reason}")]
    Runtime { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Cannot read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::FileNotFound { .. } => "FILE_NOT_FOUND",
            BridgeError::BadFile { .. } => "BAD_FILE",
            BridgeError::InvalidHandle { .. } => "INVALID_HANDLE",
            BridgeError::Cancelled => "CANCELLED",
            BridgeError::SchedulerClosed => "SCHEDULER_CLOSED",
            BridgeError::TooManyInFlight { .. } => "TOO_MANY_IN_FLIGHT",
            BridgeError::LockPoisoned { .. } => "LOCK_POISONED",
            BridgeError::Runtime { .. } => "RUNTIME_ERROR",
            BridgeError::Config { .. } => "CONFIG_ERROR",
            BridgeError::ConfigRead { .. } => "CONFIG_READ_ERROR",
            BridgeError::Io(_) => "IO_ERROR",
            BridgeError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Caller and resource errors leave the bridge untouched; the caller
    /// can retry or abandon that one resource.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::FileNotFound { .. }
                | BridgeError::BadFile { .. }
                | BridgeError::InvalidHandle { .. }
                | BridgeError::Cancelled
                | BridgeError::TooManyInFlight { .. }
        )
    }

    /// Map this error onto the status vocabulary consumed by the engine
    pub fn status(&self) -> FileStatus {
        match self {
            BridgeError::FileNotFound { .. } => FileStatus::NotFound,
            BridgeError::BadFile { .. } => FileStatus::Bad,
            BridgeError::InvalidHandle { .. } => FileStatus::InvalidHandle,
            BridgeError::Cancelled => FileStatus::DiskEjected,
            _ => FileStatus::Internal,
        }
    }
}
