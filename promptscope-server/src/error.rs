//! HTTP error mapping
//!
//! Translates core errors into status codes and JSON bodies. Absent
//! and invisible resources both come back as 404, so a caller cannot
//! probe for the existence of another tenant's data.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptscope_core::Error as CoreError;
use serde_json::json;

/// Error type for HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown bearer token
    Unauthenticated,
    /// Authenticated but not allowed to write
    Forbidden,
    NotFound(String),
    Conflict(String),
    /// Field-level payload problem
    Validation { field: String, message: String },
    /// Anything the caller cannot act on; logged, not leaked
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { what, id } => {
                ApiError::NotFound(format!("{what} not found: {id}"))
            }
            CoreError::Forbidden => ApiError::Forbidden,
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Validation { field, message } => ApiError::Validation {
                field: field.to_string(),
                message,
            },
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "authentication required"}),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({"error": "you do not have permission to perform this action"}),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({"error": msg})),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({"error": msg})),
            ApiError::Validation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": "validation failed",
                    "detail": [{"field": field, "message": message}],
                }),
            ),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal server error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
