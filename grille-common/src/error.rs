//! Common error types for the grille core

use thiserror::Error;

/// Common result type for grille core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the model, builder and codecs
#[derive(Error, Debug)]
pub enum Error {
    /// Structure definition missing expected fields; the whole build aborts
    #[error("Build error: {0}")]
    Build(String),

    /// Malformed wire-protocol token stream; nothing is partially applied
    #[error("Parse error: {0}")]
    Parse(String),

    /// Criterion value outside the accepted set {-1, 0, 1}
    #[error("Invalid criterion value: {0}")]
    InvalidValue(i64),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
