//! Unified error handling for the server.
//!
//! Errors render as `{"code": N, "error": "..."}` with the numeric codes
//! clients already understand.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error codes carried in response bodies.
pub mod codes {
    pub const INTERNAL_SERVER_ERROR: i32 = 1;
    pub const OBJECT_NOT_FOUND: i32 = 101;
    pub const INVALID_KEY_NAME: i32 = 105;
    pub const INVALID_JSON: i32 = 107;
    pub const INCORRECT_TYPE: i32 = 111;
    pub const OPERATION_FORBIDDEN: i32 = 119;
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] tether_engine::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid key name: {0}")]
    InvalidKey(String),

    #[error("Object not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    code: i32,
    error: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::Engine(e) => match e {
                tether_engine::Error::IncorrectType(_) => {
                    (StatusCode::BAD_REQUEST, codes::INCORRECT_TYPE)
                }
                tether_engine::Error::InvalidOperation(_) => {
                    (StatusCode::BAD_REQUEST, codes::OPERATION_FORBIDDEN)
                }
                tether_engine::Error::InvalidWireValue(_)
                | tether_engine::Error::ObjectsNotAllowed
                | tether_engine::Error::UnsavedObject { .. } => {
                    (StatusCode::BAD_REQUEST, codes::INVALID_JSON)
                }
                tether_engine::Error::MissingObjectId { .. } => {
                    (StatusCode::NOT_FOUND, codes::OBJECT_NOT_FOUND)
                }
                tether_engine::Error::Transport(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_SERVER_ERROR)
                }
            },
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, codes::INVALID_JSON),
            AppError::InvalidKey(_) => (StatusCode::BAD_REQUEST, codes::INVALID_KEY_NAME),
            AppError::NotFound => (StatusCode::NOT_FOUND, codes::OBJECT_NOT_FOUND),
            AppError::Unauthorized => (StatusCode::FORBIDDEN, codes::OPERATION_FORBIDDEN),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let error = match &self {
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                e.to_string()
            }
            AppError::BadRequest(msg) | AppError::InvalidKey(msg) => msg.clone(),
            AppError::NotFound => "Object not found.".to_string(),
            AppError::Unauthorized => "unauthorized".to_string(),
        };

        (status, Json(ErrorResponse { code, error })).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
