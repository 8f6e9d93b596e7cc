use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StoreError;

/// Errors surfaced by session engine operations.
///
/// Expected conditions never panic past the engine boundary: every action
/// resolves to one of these kinds, and the façade additionally mirrors the
/// failure into its status slot for passive observers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input or a voting-protocol violation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The room does not exist, is inactive, or is marked for deletion.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    /// The initial room write failed; the caller must treat the room as
    /// non-existent.
    #[error("room creation failed")]
    RoomCreationFailed(#[source] StoreError),
    /// A plan-tier limit rejected the operation.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// The replicated store rejected a write.
    #[error("update failed")]
    UpdateFailed(#[source] StoreError),
    /// Unclassified failure.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::UpdateFailed(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Allowed capacity is exhausted; upgrading the plan lifts the limit.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Transient backend failure; the caller may retry.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => AppError::BadRequest(message),
            ServiceError::RoomNotFound(room_id) => {
                AppError::NotFound(format!("room `{room_id}` not found"))
            }
            ServiceError::CapacityExceeded(message) => AppError::Forbidden(message),
            ServiceError::RoomCreationFailed(source) => {
                AppError::ServiceUnavailable(format!("room creation failed: {source}"))
            }
            ServiceError::UpdateFailed(source) => {
                AppError::ServiceUnavailable(format!("update failed: {source}"))
            }
            ServiceError::Unknown(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
