use std::error::Error as StdError;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::{board_directory::DirectoryError, storage::StorageError},
    state::session::SessionError,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The project has no planning-poker session.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// Caller is not the host, not a participant, or not a board member.
    #[error("not enough rights: {0}")]
    NotEnoughRights(String),
    /// Operation cannot be performed in the current phase.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A value supplied by the client is outside the accepted range.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// Card is unknown, out of scope, already estimated, or excluded.
    #[error("card not found: {0}")]
    CardNotFound(String),
    /// Storage or the board directory could not be reached.
    #[error("dependency unavailable")]
    Unavailable(#[source] Box<dyn StdError + Send + Sync>),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } => ServiceError::InvalidState(err.to_string()),
            StorageError::Unavailable { .. } => ServiceError::Unavailable(Box::new(err)),
        }
    }
}

impl From<DirectoryError> for ServiceError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::CardNotFound { card_id } => ServiceError::CardNotFound(card_id),
            other => ServiceError::Unavailable(Box::new(other)),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotHost(_)
            | SessionError::NotParticipant(_)
            | SessionError::ObserverCannotVote(_) => ServiceError::NotEnoughRights(err.to_string()),
            SessionError::InvalidTransition(_) | SessionError::AlreadyClosing => {
                ServiceError::InvalidState(err.to_string())
            }
            SessionError::CardExcluded(card_id) => ServiceError::CardNotFound(card_id),
        }
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
    /// Caller is missing an identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is identified but not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::SessionNotFound(project_id) => {
                AppError::NotFound(format!("no planning-poker session for project `{project_id}`"))
            }
            ServiceError::NotEnoughRights(message) => AppError::Forbidden(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::InvalidValue(message) => AppError::BadRequest(message),
            ServiceError::CardNotFound(card_id) => {
                AppError::NotFound(format!("card `{card_id}` cannot be estimated"))
            }
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
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
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
