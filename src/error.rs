//! Centralized error types for formwire.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while building or rendering a multipart body.
#[derive(Error, Debug)]
pub enum FormError {
    /// The caller supplied input the encoder cannot represent.
    #[error("Invalid multipart input: {0}")]
    Validation(String),

    /// I/O error on a file-backed source, with the associated path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The randomness source could not produce boundary bytes.
    #[error("Failed to gather randomness for boundary: {0}")]
    Entropy(String),
}

/// Convenience alias for `Result<T, FormError>`.
pub type Result<T> = std::result::Result<T, FormError>;

impl FormError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Validation` variant.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// `true` for input validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Allow `?` on `std::io::Error` for readers that have no path
/// (in-memory cursors, pipes, caller-supplied streams).
impl From<std::io::Error> for FormError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<stream>"),
            source,
        }
    }
}
