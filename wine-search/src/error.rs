//! Error types for the wine search pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while searching for wines.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend could not be reached or rejected the request
    #[error("Backend {backend} unavailable: {message}")]
    BackendUnavailable {
        backend: &'static str,
        message: String,
    },

    /// The caller supplied an unusable search term
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any displayable failure as an unavailable backend.
    pub fn unavailable(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Error::BackendUnavailable {
            backend,
            message: err.to_string(),
        }
    }

    /// Whether the orchestrator may fall through to the next backend.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidInput(_))
    }
}
