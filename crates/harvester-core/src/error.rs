use thiserror::Error;

/// Application-wide error types for the harvester.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Page automation (headless browser) failed.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// The fetched page did not yield a usable record.
    #[error("Extraction rejected: {0}")]
    ExtractionRejected(String),

    /// Work queue storage operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout")
                    || msg.contains("connect")
                    || msg.contains("reset")
                    || msg.contains("HTTP 5")
                    || msg.contains("HTTP 429")
            }
            _ => false,
        }
    }

    /// Returns true for errors that must halt the owning loop instead of
    /// being recorded against a single URL.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_) | AppError::IoError(_) | AppError::ConfigError(_)
        )
    }
}
