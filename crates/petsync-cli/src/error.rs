use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] petsync_core::Error),
    #[error(transparent)]
    LibSql(#[from] libsql::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Pet ID cannot be empty")]
    EmptyPetId,
    #[error("Pet not found for id/prefix: {0}")]
    PetNotFound(String),
    #[error("{0}")]
    AmbiguousPetId(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("No fields to change")]
    NoChanges,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Sync is not configured. Run `petsync config init --api-base-url <URL>` or set PETSYNC_API_BASE_URL."
    )]
    SyncNotConfigured,
}
