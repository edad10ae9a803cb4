use thiserror::Error;
use warp::http::StatusCode;

use crate::imagehost::ImageHostError;
use crate::storage::StorageError;

/// Failure of a clinic operation
#[derive(Debug, Error)]
pub enum ClinicError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Image host error: {0}")]
    ImageHost(#[from] ImageHostError),
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

pub type Result<T> = std::result::Result<T, ClinicError>;

impl ClinicError {
    pub fn not_found(what: &str) -> Self {
        ClinicError::NotFound(format!("{} not found", what))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ClinicError::Validation(_) => StatusCode::BAD_REQUEST,
            ClinicError::NotFound(_) => StatusCode::NOT_FOUND,
            ClinicError::Conflict(_) => StatusCode::CONFLICT,
            ClinicError::Storage(_) | ClinicError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ClinicError::ImageHost(ImageHostError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ClinicError::ImageHost(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether this is a server-side failure rather than a bad request
    pub fn is_unexpected(&self) -> bool {
        self.status_code().is_server_error()
    }
}
