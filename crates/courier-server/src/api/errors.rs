//! Error handling for the Courier server API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::error::ServerError;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Unauthorized (401)
    Unauthorized(String),
    /// Forbidden (403)
    Forbidden(String),
    /// Wrapped server error
    ServerError(ServerError),
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError::ServerError(err)
    }
}

impl From<courier_core::CoreError> for ApiError {
    fn from(err: courier_core::CoreError) -> Self {
        ApiError::ServerError(err.into())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ServerError(err) => write!(f, "Server Error: {}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "ERR_UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "ERR_FORBIDDEN", msg),
            ApiError::ServerError(err) => server_error_parts(err),
        };

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}

fn server_error_parts(err: ServerError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "ERR_NOT_FOUND", message),
        ServerError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR", msg),
        ServerError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "ERR_UNAUTHORIZED", msg),
        ServerError::Conflict(msg) => (StatusCode::CONFLICT, "ERR_CONFLICT", msg),
        ServerError::UpstreamError(msg) => (StatusCode::BAD_GATEWAY, "ERR_UPSTREAM_ERROR", msg),
        ServerError::ConfigurationError(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_CONFIGURATION_ERROR",
            msg,
        ),
        ServerError::InternalError(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_INTERNAL_SERVER_ERROR",
            msg,
        ),
    }
}
