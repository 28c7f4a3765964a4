//! Error types for feedrelay.

use thiserror::Error;

use crate::schedule::Frequency;

/// Common error type for feedrelay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration error. Fatal at startup, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error talking to the external email/list platform.
    #[error("platform error: {0}")]
    Platform(String),

    /// Feed fetch error (network, HTTP status, size limit).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Feed parsing error.
    #[error("feed parse error: {0}")]
    Parse(String),

    /// A required transactional template does not exist.
    #[error("template missing for frequency {0}")]
    TemplateMissing(Frequency),

    /// Validation error for caller-supplied input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for feedrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
