//! Error taxonomy shared by collaborators, strategies and the processor.

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Extraction service has no requests available; retryable only after
    /// the stated delay.
    #[error("extraction rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Misconfigured credentials. Never retried automatically.
    #[error("extraction auth error: {0}")]
    Auth(String),

    /// Generic network/HTTP failure from a collaborator.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// Invalid input detected synchronously (empty zone name, slot out of
    /// range). Aborts the single record, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Read/write failure on a durable file.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a bounded retry loop should give this error another attempt.
    /// Auth failures are final; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Auth(_) | Error::Validation(_))
    }

    /// Short label used in halt reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::RateLimited { .. } => "rate-limited",
            Error::Auth(_) => "auth",
            Error::Unavailable(_) => "unavailable",
            Error::Validation(_) => "validation",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }
}
