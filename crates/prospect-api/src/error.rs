//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same JSON error body and maps engine
//! errors to HTTP status codes. Internal details are logged, not returned.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use prospect_core::error::ProspectError;
use prospect_engine::EngineError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - malformed body or invalid field.
    BadRequest(String),
    /// 403 - the call belongs to another user.
    Forbidden(String),
    NotFound(String),
    /// 500 - detail is logged, a generic message is returned.
    Internal(String),
    /// 503 - an upstream provider failed.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            EngineError::CallOwnership { .. } => ApiError::Forbidden(err.to_string()),
            // Turns report these as SSE `error` or `voice_error` frames; only
            // non-streaming callers reach this arm.
            EngineError::LlmError(_) | EngineError::EmptyReply | EngineError::VoiceError(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            EngineError::StorageError(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ProspectError> for ApiError {
    fn from(err: ProspectError) -> Self {
        match err {
            ProspectError::InvalidDifficulty(_) | ProspectError::Config(_) => {
                ApiError::BadRequest(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_status() {
        let cases = [
            (EngineError::EmptyMessage, StatusCode::BAD_REQUEST),
            (
                EngineError::CallOwnership {
                    call_id: "c".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                EngineError::LlmError("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                EngineError::VoiceError("no audio".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                EngineError::StorageError("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let resp = ApiError::from(err).into_response();
            assert_eq!(resp.status(), status);
        }
    }

    #[test]
    fn test_invalid_difficulty_is_bad_request() {
        let resp = ApiError::from(ProspectError::InvalidDifficulty(7)).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
