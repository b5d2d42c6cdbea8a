//! Error types for taskrelay
//!
//! Errors shared by every layer

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// taskrelay error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // request (caller's fault)
    // ========================================================================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // status store
    // ========================================================================
    /// An identifier was allocated twice. Identifiers are random v4 UUIDs, so
    /// this is a bug rather than a retryable condition.
    #[error("Duplicate request id: {0}")]
    DuplicateId(String),

    #[error("Request already completed: {0}")]
    AlreadyCompleted(String),

    // ========================================================================
    // execution
    // ========================================================================
    #[error("Execution failed: {0}")]
    Execution(String),

    // ========================================================================
    // config
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // external
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the message is safe to show the caller
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::InvalidInput(_) | Error::NotFound(_)
        )
    }

    /// Build a `NotFound` error
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }
}
