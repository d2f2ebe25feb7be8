//! Match and nearby-count endpoints.

use axum::extract::{Extension, Json, State};
use live_match::{
    matching::{CurrentMatch, MatchId, NearbyCount},
    profile::UserId,
};
use serde::{Deserialize, Serialize};

use super::{AppState, error::ApiError, extract::ApiJson};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchActionRequest {
    pub match_id: MatchId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchActionResponse {
    pub ok: bool,
    pub match_id: MatchId,
}

/// `POST /match/decline`
pub async fn decline_match(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(request): ApiJson<MatchActionRequest>,
) -> Result<Json<MatchActionResponse>, ApiError> {
    let declined = state
        .live
        .matches
        .decline(user_id, request.match_id)
        .await?;
    Ok(Json(MatchActionResponse {
        ok: true,
        match_id: declined.id,
    }))
}

/// `POST /match/accept`
pub async fn accept_match(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(request): ApiJson<MatchActionRequest>,
) -> Result<Json<MatchActionResponse>, ApiError> {
    let accepted = state
        .live
        .matches
        .accept(user_id, request.match_id)
        .await?;
    Ok(Json(MatchActionResponse {
        ok: true,
        match_id: accepted.id,
    }))
}

/// `GET /match/current`
pub async fn current_match(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<CurrentMatch>, ApiError> {
    Ok(Json(state.live.matches.current(user_id).await?))
}

/// `GET /nearby/count`
pub async fn nearby_count(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<NearbyCount>, ApiError> {
    Ok(Json(state.live.matches.nearby(user_id).await?))
}
