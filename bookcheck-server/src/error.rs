//! HTTP error mapping
//!
//! Every failure leaves the server as `{success:false, message, errors}`
//! with a status matching the error kind.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookcheck_common::api::ErrorEnvelope;
use bookcheck_common::Error;
use thiserror::Error as ThisError;
use tracing::error;

/// API error type
#[derive(Debug, ThisError)]
pub enum ApiError {
    /// Domain, storage or credential failure
    #[error(transparent)]
    Common(#[from] Error),

    /// Request body could not be read; keeps the extractor's status (400, 413, 415)
    #[error("Invalid request body: {1}")]
    Rejected(StatusCode, String),
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Rejected(err.status(), err.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::Rejected(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Rejected(err.status(), err.body_text())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Common(Error::Database(err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Common(Error::Io(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(status, _) => *status,
            ApiError::Common(err) => match err {
                Error::Validation { .. } | Error::InvalidCredentials => StatusCode::BAD_REQUEST,
                Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                Error::Forbidden(_) => StatusCode::FORBIDDEN,
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::Conflict(_) => StatusCode::CONFLICT,
                Error::Config(_)
                | Error::Database(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            ApiError::Common(Error::Validation { message, errors }) => {
                ErrorEnvelope::new(message, errors)
            }
            ApiError::Common(err) if err.is_internal() => {
                error!("Request failed: {}", err);
                ErrorEnvelope::new("Internal server error", Vec::new())
            }
            other => ErrorEnvelope::new(other.to_string(), Vec::new()),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
