//! Errors raised by warehouse domain rules.

use thiserror::Error;

use crate::quantity::Quantity;

pub type DomainResult<T> = Result<T, DomainError>;

/// A business rule rejected a command or value.
///
/// Storage and transport failures never appear here; they are wrapped by
/// the error types of the crates that perform the IO.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A movement would take availability below zero.
    #[error("not enough stock available (available: {available}, requested: {requested})")]
    InsufficientStock { available: Quantity, requested: Quantity },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// The record already exists.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
