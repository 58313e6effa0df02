//! Error types for the grille engine
//!
//! Transport failures and server rejections are recoverable: the engine
//! falls back to the offline queue instead of surfacing them as data loss.

use thiserror::Error;

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Core model, builder or codec errors
    #[error("{0}")]
    Core(#[from] grille_common::Error),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or payload (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network unreachable or request timed out
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server replied with a structured failure message
    #[error("Server rejection: {0}")]
    Rejected(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested tree node or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures the coordinator recovers from by securing the
    /// control locally
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Rejected(_))
    }
}
