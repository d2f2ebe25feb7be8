//! Live profile, photo and preference endpoints.

use axum::{
    extract::{Extension, Json, Multipart, State},
    http::StatusCode,
};
use live_match::profile::{
    PhotoUpload, Preferences, PreferencesUpdate, ProfileRequest, ProfileView, UserId,
};

use super::{AppState, error::ApiError, extract::ApiJson};

/// Multipart field carrying the photo
const PHOTO_FIELD: &str = "photo";

/// `POST /profile`
pub async fn create_profile(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(request): ApiJson<ProfileRequest>,
) -> Result<(StatusCode, Json<ProfileView>), ApiError> {
    let profile = state.live.profiles.create_profile(user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /profile`
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<ProfileView>, ApiError> {
    Ok(Json(state.live.profiles.get_profile(user_id).await?))
}

/// `PATCH /profile`
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(request): ApiJson<ProfileRequest>,
) -> Result<Json<ProfileView>, ApiError> {
    Ok(Json(
        state.live.profiles.update_profile(user_id, &request).await?,
    ))
}

/// `POST /profile/photo`
///
/// Expects a multipart form with a `photo` file field. The declared content
/// type must agree with the file's magic bytes.
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    mut multipart: Multipart,
) -> Result<Json<PhotoUpload>, ApiError> {
    let invalid = |message: String| ApiError::bad_request("INVALID_PHOTO", message);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid(format!("Malformed upload: {}", e.body_text())))?
    {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| invalid(format!("Malformed upload: {}", e.body_text())))?;

        let upload = state
            .live
            .profiles
            .upload_photo(user_id, &content_type, bytes.to_vec())
            .await?;
        return Ok(Json(upload));
    }

    Err(invalid(format!("Missing '{PHOTO_FIELD}' field")))
}

/// `POST /preferences`
pub async fn create_preferences(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(update): ApiJson<PreferencesUpdate>,
) -> Result<(StatusCode, Json<Preferences>), ApiError> {
    let preferences = state
        .live
        .profiles
        .create_preferences(user_id, &update)
        .await?;
    Ok((StatusCode::CREATED, Json(preferences)))
}

/// `GET /preferences`
pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<Preferences>, ApiError> {
    Ok(Json(state.live.profiles.get_preferences(user_id).await?))
}

/// `PATCH /preferences`
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(update): ApiJson<PreferencesUpdate>,
) -> Result<Json<Preferences>, ApiError> {
    Ok(Json(
        state
            .live
            .profiles
            .update_preferences(user_id, &update)
            .await?,
    ))
}
