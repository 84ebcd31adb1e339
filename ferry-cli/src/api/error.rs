//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ferry_engine::{Error, ErrorKind};
use serde::Serialize;

use crate::error::AppError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Create a 422 Unprocessable Entity error.
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "UNSUPPORTED", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        let api = match kind {
            ErrorKind::MissingUrl
            | ErrorKind::InvalidUrl
            | ErrorKind::ParseError
            | ErrorKind::Configuration => ApiError::bad_request(message),
            ErrorKind::InvalidDomain => ApiError::forbidden(message),
            ErrorKind::NotFound => ApiError::not_found(message),
            ErrorKind::DuplicateDownload => ApiError::conflict(message),
            ErrorKind::Unsupported => ApiError::unprocessable(message),
            ErrorKind::NetworkError | ErrorKind::UpstreamHttpError => {
                ApiError::bad_gateway(message)
            }
            ErrorKind::Io | ErrorKind::Cancelled => {
                tracing::error!("Engine error: {}", err);
                ApiError::internal(message)
            }
        };

        let mut details = serde_json::json!({ "kind": kind });
        if let Some(status) = err.status() {
            details["upstream_status"] = status.as_u16().into();
        }
        if err.is_stale_session() {
            details["stale_session"] = true.into();
        }
        api.with_details(details)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Engine(err) => err.into(),
            AppError::InvalidCookie(_) | AppError::InvalidArgument(_) => {
                ApiError::bad_request(err.to_string())
            }
            other => {
                tracing::error!("Unexpected error: {}", other);
                ApiError::internal(other.to_string())
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_status_codes() {
        let cases = [
            (Error::MissingUrl, StatusCode::BAD_REQUEST),
            (Error::invalid_url("::", "bad"), StatusCode::BAD_REQUEST),
            (Error::invalid_domain("evil.example"), StatusCode::FORBIDDEN),
            (
                Error::NotFound {
                    episode_id: "e1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                Error::DuplicateDownload {
                    episode_id: "e1".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                Error::unsupported("encrypted"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                Error::http_status(StatusCode::NOT_FOUND, "https://cdn.example.com/a.ts"),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status, "{}", api.message);
        }
    }

    #[test]
    fn upstream_forbidden_is_flagged_as_stale_session() {
        let api: ApiError =
            Error::http_status(StatusCode::FORBIDDEN, "https://cdn.example.com/a.ts").into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        let details = api.details.unwrap();
        assert_eq!(details["kind"], "upstream_http_error");
        assert_eq!(details["upstream_status"], 403);
        assert_eq!(details["stale_session"], true);
    }

    #[test]
    fn cookie_errors_are_bad_requests() {
        let api: ApiError = AppError::InvalidCookie("junk".into()).into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, "BAD_REQUEST");
    }
}
