//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.
//! Authentication failures share one generic body; the cause is only logged.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use taper_auth::AuthError;
use taper_session::SessionError;
use taper_store::StoreError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The account is not allowed to use the API.
    #[error("forbidden")]
    Forbidden,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal server error. Details are logged, never returned.
    #[error("internal server error")]
    Internal,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Malformed(_)
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::WrongTokenType { .. }
            | AuthError::InvalidUserId => {
                tracing::debug!(error = %err, "Token rejected");
                Self::Unauthorized
            }
            AuthError::Internal(_) => {
                tracing::error!(error = %err, "Token signing error");
                Self::Internal
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UserNotFound => Self::NotFound("user".to_string()),
            SessionError::InvalidOtp | SessionError::RefreshRejected(_) => {
                tracing::debug!(error = %err, "Credentials rejected");
                Self::Unauthorized
            }
            SessionError::Auth(auth_err) => Self::from(auth_err),
            SessionError::Store(store_err) => Self::from(store_err),
            SessionError::Dispatch(_) | SessionError::Internal(_) => {
                tracing::error!(error = %err, "Session error");
                Self::Internal
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store error");
        Self::Internal
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taper_session::RefreshRejection;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("user".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_codes() {
        assert_eq!(ApiError::Unauthorized.code(), "unauthorized");
        assert_eq!(ApiError::Forbidden.code(), "forbidden");
        assert_eq!(ApiError::NotFound("user".into()).code(), "not_found");
        assert_eq!(ApiError::BadRequest("test".into()).code(), "bad_request");
        assert_eq!(ApiError::Internal.code(), "internal_error");
    }

    #[test]
    fn credential_failures_are_indistinguishable() {
        let errors = [
            ApiError::from(AuthError::TokenExpired),
            ApiError::from(AuthError::InvalidSignature),
            ApiError::from(SessionError::InvalidOtp),
            ApiError::from(SessionError::RefreshRejected(RefreshRejection::Mismatch)),
        ];

        for err in errors {
            assert!(matches!(err, ApiError::Unauthorized));
            assert_eq!(err.to_string(), "unauthorized");
        }
    }

    #[test]
    fn internal_detail_is_hidden() {
        let err = ApiError::from(SessionError::Dispatch("twilio said no".into()));
        assert!(matches!(err, ApiError::Internal));
        assert!(!err.to_string().contains("twilio"));

        let err = ApiError::from(StoreError::Database("disk full".into()));
        assert_eq!(err.to_string(), "internal server error");
    }

    #[test]
    fn unknown_user_is_not_found() {
        assert!(matches!(
            ApiError::from(SessionError::UserNotFound),
            ApiError::NotFound(_)
        ));
    }
}
