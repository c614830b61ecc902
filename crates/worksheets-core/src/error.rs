//! Error types for worksheets-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in worksheets-core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Text that is not a canonical value literal
    #[error("Invalid value literal: {0}")]
    InvalidValue(String),

    /// Value kind does not fit the declared field type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

impl Error {
    /// Create a new "invalid value" error with a message
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Error::InvalidValue(msg.into())
    }
}
