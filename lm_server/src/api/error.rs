//! Mapping from domain errors to HTTP responses.
//!
//! Every error body has the shape `{ "error": <message>, "code": <CODE> }`.
//! Internal failures are logged with their detail and reported to the client
//! with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use live_match::{matching::MatchError, profile::ProfileError, session::SessionError};
use serde_json::json;

/// An error ready to be sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Missing or invalid access token",
        )
    }

    /// Log `detail` and return a sanitized 500
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "code": self.code })),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::Store(_) => return ApiError::internal(&err),
            SessionError::Geo(_)
            | SessionError::ProfileRequired
            | SessionError::InvalidDuration { .. }
            | SessionError::InvalidExtension { .. } => StatusCode::BAD_REQUEST,
            SessionError::SessionAlreadyActive => StatusCode::CONFLICT,
            SessionError::NoActiveSession => StatusCode::NOT_FOUND,
        };
        ApiError::new(status, err.code(), err.client_message())
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        let status = match &err {
            ProfileError::Store(_) | ProfileError::Collaborator(_) => {
                return ApiError::internal(&err);
            }
            ProfileError::UserNotFound(_)
            | ProfileError::ProfileNotFound(_)
            | ProfileError::PreferencesNotFound(_) => StatusCode::NOT_FOUND,
            ProfileError::ProfileAlreadyExists(_) | ProfileError::PreferencesAlreadyExist(_) => {
                StatusCode::CONFLICT
            }
            ProfileError::DescriptionTooLong { .. }
            | ProfileError::InvalidPreferences(_)
            | ProfileError::InvalidPhoto(_) => StatusCode::BAD_REQUEST,
        };
        ApiError::new(status, err.code(), err.client_message())
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Store(_) => ApiError::internal(&err),
            MatchError::Profile(inner) => inner.into(),
            // Match endpoints treat a missing session as a bad request
            MatchError::NoActiveSession => {
                ApiError::bad_request(err.code(), err.client_message())
            }
            MatchError::MatchNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, err.code(), err.client_message())
            }
        }
    }
}
