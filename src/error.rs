use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// A live record preventing a delete, returned so the caller can resolve it.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingRecord {
    pub id: Uuid,
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("delete blocked by {} live record(s)", .0.len())]
    Conflict(Vec<BlockingRecord>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage operation timed out; safe to retry")]
    Transient,

    #[error("storage unavailable")]
    Unavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Timeout => Self::Transient,
            StorageError::Unavailable(_) => Self::Unavailable,
            StorageError::Backend(detail) => Self::Internal(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Conflict(blocking) => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "blocking": blocking }),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Transient | AppError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": self.to_string() }),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}
