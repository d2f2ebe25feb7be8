//! Request extractors with structured rejections.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use super::error::ApiError;

/// `Json<T>` whose rejection is a 400 `INVALID_REQUEST` error body
///
/// Covers syntax errors, wrong field types, missing fields and a missing
/// `Content-Type: application/json` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(
                "INVALID_REQUEST",
                rejection.body_text(),
            )),
        }
    }
}
