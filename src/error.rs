//! Error types for subfetch
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Provider, Transfer, pipeline state, etc.)
//! - Stable machine-readable error codes for consumers that render failures
//! - Context information (stage, file path, job ID, etc.)

use crate::types::JobId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for subfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for subfetch
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "language")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fingerprint could not be computed for the video file
    #[error("hash error: {0}")]
    Hash(String),

    /// Subtitle provider error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Subtitle file transfer returned an unsuccessful HTTP status
    #[error("transfer of {reference} failed with HTTP status {status}")]
    Transfer {
        /// The download reference that was requested
        reference: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// Downloaded payload is not a valid gzip stream
    #[error("decompression error: {0}")]
    Decompress(String),

    /// Download reference is missing or not an absolute URL
    #[error("invalid download reference: {0}")]
    InvalidReference(String),

    /// Target subtitle path exists and the collision action forbids replacing it
    #[error("file collision at {}", path.display())]
    FileCollision {
        /// The path that already exists
        path: PathBuf,
    },

    /// External media launcher failed
    #[error("launch error: {0}")]
    Launch(String),

    /// Task payload exceeded the configured stage timeout
    #[error("task '{task}' timed out after {after:?}")]
    Timeout {
        /// Name of the task that timed out
        task: String,
        /// Configured timeout that elapsed
        after: Duration,
    },

    /// Task payload or continuation panicked
    #[error("task '{task}' panicked")]
    TaskPanicked {
        /// Name of the task that panicked
        task: String,
    },

    /// Pipeline state machine rejected a transition
    #[error("invalid transition '{transition}' from status {from}")]
    InvalidTransition {
        /// Status the job was in
        from: String,
        /// Transition that was attempted
        transition: String,
    },

    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// No file was supplied for processing
    #[error("no file supplied")]
    NoFiles,

    /// More than one file was supplied; only single-file processing is supported
    #[error("multiple files not supported: got {count}, expected 1")]
    MultipleFiles {
        /// Number of files supplied
        count: usize,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors reported by a subtitle provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider refused the supplied credentials
    #[error("login rejected")]
    LoginRejected,

    /// Provider rejected a request (bad token, malformed query, quota)
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Provider could not be reached or is temporarily unavailable
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Stable snake_case identifier for this error, for consumers that map failures
    /// to localized messages
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Hash(_) => "hash_error",
            Error::Provider(ProviderError::LoginRejected) => "login_rejected",
            Error::Provider(ProviderError::Rejected(_)) => "provider_rejected",
            Error::Provider(ProviderError::Unavailable(_)) => "provider_unavailable",
            Error::Transfer { .. } => "transfer_failed",
            Error::Decompress(_) => "decompress_error",
            Error::InvalidReference(_) => "invalid_reference",
            Error::FileCollision { .. } => "file_collision",
            Error::Launch(_) => "launch_error",
            Error::Timeout { .. } => "timeout",
            Error::TaskPanicked { .. } => "task_panicked",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::JobNotFound(_) => "job_not_found",
            Error::NoFiles => "no_files",
            Error::MultipleFiles { .. } => "multiple_files",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}
