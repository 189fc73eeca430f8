//! Error types for petsync-core

use thiserror::Error;

/// Result type alias using petsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in petsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("Store error: {0}")]
    Store(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level failure talking to the sync API
    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Non-success HTTP status from the sync API
    #[error("Sync API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
}
