use crate::storage::StorageError;
use crate::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload exceeds the configured size limit
    #[error("File too large (limit is {limit} bytes)")]
    TooLarge { limit: u64 },

    /// File extension is not in the allow-list
    #[error("File type '{extension}' not allowed")]
    DisallowedExtension { extension: String },

    /// A file with this name is already stored
    #[error("File {name} already exists")]
    AlreadyExists { name: String },

    /// No file with this name is stored
    #[error("File {name} not found")]
    NotFound { name: String },

    /// Missing or wrong bearer credential
    #[error("Not authenticated")]
    Forbidden,

    /// Malformed request, e.g. a multipart body without a file
    #[error("{message}")]
    BadRequest { message: String },

    /// The storage backend could not be reached
    #[error("Error connecting to storage: {0:#}")]
    BackendUnavailable(anyhow::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::DisallowedExtension { .. } => StatusCode::BAD_REQUEST,
            Error::AlreadyExists { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::BackendUnavailable(_) | Error::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::TooLarge { .. } => "File too large".to_string(),
            Error::DisallowedExtension { .. } => "File type not allowed".to_string(),
            Error::AlreadyExists { .. } => "File already exists".to_string(),
            Error::NotFound { .. } => "File not found".to_string(),
            Error::Forbidden => "Not authenticated".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::BackendUnavailable(_) => "Error connecting to storage".to_string(),
            Error::Unexpected(_) => "Internal server error".to_string(),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::TooLarge { limit, .. } => Error::TooLarge { limit },
            ValidationError::DisallowedExtension { extension } => Error::DisallowedExtension { extension },
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(e) => Error::BackendUnavailable(e),
            StorageError::InvalidKey { key, reason } => Error::BadRequest {
                message: format!("Invalid file name '{key}': {reason}"),
            },
            StorageError::Other(e) => Error::Unexpected(e),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::BackendUnavailable(_) | Error::Unexpected(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Forbidden => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::AlreadyExists { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorBody {
            detail: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
