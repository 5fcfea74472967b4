//! Error taxonomy shared by the scheduler, the verification pipeline and
//! the HTTP layer.
//!
//! File-level failures (`ProbeTimeout`, `ProbeFailure`) are folded into a
//! file's health classification and never abort a job. `JobFailure` fails a
//! single job. `Config` is fatal only at startup.

use std::path::PathBuf;
use std::time::Duration;

/// Common error type for omniscan.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path is not below any enabled watched root.
    #[error("Path is outside every watched root: {}", .0.display())]
    OutOfScope(PathBuf),

    /// The path is malformed or cannot be resolved.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A per-file probe exceeded its deadline.
    #[error("Probe timed out after {}s", .0.as_secs())]
    ProbeTimeout(Duration),

    /// A per-file probe failed.
    #[error("Probe failed: {0}")]
    ProbeFailure(String),

    /// A scan job could not run to completion.
    #[error("Scan job {job} failed: {reason}")]
    JobFailure { job: String, reason: String },

    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested item was not found.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new InvalidPath error.
    pub fn invalid_path<P: Into<String>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new JobFailure error.
    pub fn job_failure<J: ToString, S: Into<String>>(job: J, reason: S) -> Self {
        Self::JobFailure {
            job: job.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new ProbeFailure error.
    pub fn probe<S: Into<String>>(msg: S) -> Self {
        Self::ProbeFailure(msg.into())
    }

    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code a caller should see for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidPath { .. } | Self::Config(_) => 400,
            Self::NotFound(_) => 404,
            Self::OutOfScope(_) => 422,
            Self::ProbeTimeout(_) => 504,
            Self::ProbeFailure(_)
            | Self::JobFailure { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfScope(_) => "out_of_scope",
            Self::InvalidPath { .. } => "invalid_path",
            Self::ProbeTimeout(_) => "probe_timeout",
            Self::ProbeFailure(_) => "probe_failure",
            Self::JobFailure { .. } => "job_failure",
            Self::Config(_) => "config_error",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
