//! Signed photo downloads.
//!
//! Photo URLs are bearer links: the signature and expiry in the query string
//! are the only credentials, so they can be used directly from `<img>` tags.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use super::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub expires: i64,
    pub sig: String,
}

/// `GET /photos/{*key}`
pub async fn get_photo(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PhotoQuery>,
) -> Result<Response, ApiError> {
    let content_type = state
        .photos
        .verify(&key, query.expires, &query.sig, Utc::now().timestamp())
        .map_err(|e| ApiError::new(StatusCode::FORBIDDEN, "PHOTO_LINK_INVALID", e.to_string()))?;

    let bytes = state
        .photos
        .read(&key)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "PHOTO_NOT_FOUND", "Photo not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=300"),
        ],
        bytes,
    )
        .into_response())
}
