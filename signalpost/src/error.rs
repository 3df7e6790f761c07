//! Error types for signalpost

use thiserror::Error;

/// Main error type for the signalpost library
#[derive(Error, Debug)]
pub enum Error {
    /// Durable queue error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/transport error
    #[error("network error: {0}")]
    Network(String),
}

/// Result type alias for signalpost
pub type Result<T> = std::result::Result<T, Error>;
