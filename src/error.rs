use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed user input; the conversation re-prompts the same step.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A prerequisite is missing, e.g. no phone on file.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Another driver won the race for this trip.
    #[error("trip already claimed")]
    AlreadyClaimed,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("not authorized")]
    NotAuthorized,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) | AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Precondition(msg) => (StatusCode::PRECONDITION_FAILED, msg.clone()),
            AppError::AlreadyClaimed => (StatusCode::CONFLICT, "trip already claimed".to_string()),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotAuthorized => (StatusCode::FORBIDDEN, "not authorized".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Crypto(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
