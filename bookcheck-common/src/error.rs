//! Common error types for BookCheck

use serde::Serialize;
use thiserror::Error;

/// Common result type for BookCheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single offending input field, reported back to the client in `errors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error taxonomy shared by the repository, credential store and HTTP layer
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input (400)
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    /// Missing or invalid session token (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch the resource (403)
    #[error("{0}")]
    Forbidden(String),

    /// Requested resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Duplicate username or email (409)
    #[error("{0}")]
    Conflict(String),

    /// Unknown login identifier or password mismatch
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored record could not be decoded
    #[error("Corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Validation failure for one named field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Error::Validation {
            errors: vec![FieldError::new(field, message.clone())],
            message,
        }
    }

    /// True for failures caused by storage or the host rather than by the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Database(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::Internal(_)
        )
    }
}
