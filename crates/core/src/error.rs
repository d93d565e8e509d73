//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Why a reminder entry or identifier was rejected.
///
/// Only deterministic input failures live here. Persistence and transport
/// failures have their own error types in the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field was absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A value was present but malformed (bad date, unknown basis label).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A tenant or reminder identifier was empty, too long or not path-safe.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Too few digits left after normalization.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
}

impl DomainError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField(field)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
