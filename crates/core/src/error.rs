//! Shared error model for value parsing.

use thiserror::Error;

/// Result type used by the core value types.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error raised while building core values from untrusted input.
///
/// Storage and delivery failures have their own error types next to the
/// components that produce them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. an empty namespace).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
