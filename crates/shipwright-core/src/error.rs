//! Error types for cluster operations.
//!
//! The taxonomy mirrors how callers react to a failure: `BadParameter` and
//! `NotFound` are never retried, `AlreadyExists` is an idempotency signal,
//! `LimitExceeded`/`ConnectionProblem` are retried by polling loops and
//! `AccessDenied` aborts them.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Comprehensive error type for all operation engine failures.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Invalid input, configuration or manifest mismatch
    #[error("{message}")]
    BadParameter { message: String },
    /// A referenced entity (operation, plan, phase, package) does not exist
    #[error("{message}")]
    NotFound { message: String },
    /// The entity was already created, e.g. a plan was initialized twice
    #[error("{message}")]
    AlreadyExists { message: String },
    /// A deadline elapsed before the work completed
    #[error("{message}")]
    LimitExceeded { message: String },
    /// A remote peer could not be reached
    #[error("{message}")]
    ConnectionProblem { message: String },
    /// The remote peer refused the request permanently
    #[error("{message}")]
    AccessDenied { message: String },
    /// A remote or local command exited unsuccessfully
    #[error("command `{command}` failed: {message}")]
    Exec { command: String, message: String },
    /// Several independent failures reported at once
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<OpsError>),
    /// Database connection or query errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
    /// A background task panicked or was cancelled
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn join_errors(errors: &[OpsError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl OpsError {
    pub fn bad_parameter(message: impl Into<String>) -> Self {
        Self::BadParameter {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::LimitExceeded {
            message: message.into(),
        }
    }

    pub fn connection_problem(message: impl Into<String>) -> Self {
        Self::ConnectionProblem {
            message: message.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new database error with additional context.
    pub fn database_error(message: &str, source: rusqlite::Error) -> Self {
        Self::Database {
            message: message.to_string(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_bad_parameter(&self) -> bool {
        matches!(self, Self::BadParameter { .. })
    }

    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Whether a polling loop should back off and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LimitExceeded { .. } | Self::ConnectionProblem { .. }
        )
    }

    /// Collapses a list of errors: no errors is success, a single error is
    /// returned as is, several become [`OpsError::Aggregate`].
    pub fn aggregate(mut errors: Vec<OpsError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }
}

/// Extension trait for Result to wrap foreign errors with context.
pub trait ResultExt<T> {
    /// Add context to any error type, converting it to a
    /// [`OpsError::Configuration`].
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display,
    {
        self.map_err(|e| OpsError::Configuration {
            message: format!("{context}: {e}"),
        })
    }
}

/// Specialized extension trait for database-related Results.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|e| OpsError::database_error(message, e))
    }
}

/// Result type alias for operation engine calls
pub type Result<T> = std::result::Result<T, OpsError>;
