//! Common error types for podwire.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`PodwireError`].
pub type PodwireResult<T> = Result<T, PodwireError>;

/// Errors shared across podwire crates.
#[derive(Error, Diagnostic, Debug)]
pub enum PodwireError {
    /// Invalid container ID format.
    #[error("Invalid container ID: {id:?}")]
    #[diagnostic(
        code(podwire::container::invalid_id),
        help("Container IDs must be non-empty and must not contain whitespace or '/'")
    )]
    InvalidContainerId {
        /// The invalid container ID.
        id: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(podwire::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(podwire::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(podwire::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl From<serde_json::Error> for PodwireError {
    fn from(err: serde_json::Error) -> Self {
        PodwireError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PodwireError::InvalidContainerId { id: String::new() };
        assert_eq!(err.to_string(), "Invalid container ID: \"\"");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PodwireError = io_err.into();
        assert!(matches!(err, PodwireError::Io(_)));
    }

    #[test]
    fn error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PodwireError = json_err.into();
        assert!(matches!(err, PodwireError::Serialization(_)));
    }
}
