//! API error handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

/// API error type. Serializes to the stable `{error, details?}` shape.
#[derive(Debug)]
pub enum ApiError {
    Validation {
        message: String,
        details: Option<Value>,
    },
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>, details: Option<Value>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation { message, details } => {
                let mut body = json!({ "error": message });
                if let Some(details) = details {
                    body["details"] = details;
                }
                (StatusCode::BAD_REQUEST, body)
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Internal(message) => {
                error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<conductor_db::DbError> for ApiError {
    fn from(err: conductor_db::DbError) -> Self {
        match err {
            conductor_db::DbError::NotFound(msg) => ApiError::NotFound(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
