//! Errors produced by the attachment engine and its backends.

use miette::Diagnostic;
use podwire_common::PodwireError;
use thiserror::Error;

/// Result type alias using [`NetworkError`].
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors surfaced by attach and detach operations.
#[derive(Error, Diagnostic, Debug)]
pub enum NetworkError {
    /// A request field could not be turned into resource names.
    #[error("Naming error: {message}")]
    #[diagnostic(code(podwire::naming))]
    Naming {
        /// What went wrong.
        message: String,
    },

    /// A backend rejected or failed to execute a transaction.
    #[error("Failed to {operation}: {message}")]
    #[diagnostic(
        code(podwire::backend::apply),
        help("The backend error is reported verbatim; bookkeeping was left unchanged")
    )]
    BackendApply {
        /// The operation that failed (e.g. "create link pair").
        operation: String,
        /// The backend's error text.
        message: String,
    },

    /// A resource expected to exist was not found.
    #[error("Interface not found: {name}")]
    #[diagnostic(code(podwire::interface::not_found))]
    InterfaceLookup {
        /// The interface name that was looked up.
        name: String,
    },

    /// Error from the shared podwire layer.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Common(#[from] PodwireError),
}

impl NetworkError {
    /// Build a [`NetworkError::BackendApply`] from an operation and any displayable error.
    pub fn backend(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::BackendApply {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a backend error with the context of the transaction that carried it.
    ///
    /// Errors that are not [`NetworkError::BackendApply`] are returned as-is.
    #[must_use]
    pub fn within(self, context: &str) -> Self {
        match self {
            Self::BackendApply { operation, message } => Self::BackendApply {
                operation: format!("{context}: {operation}"),
                message,
            },
            other => other,
        }
    }
}
