//! Live session endpoints.

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use live_match::{
    profile::UserId,
    session::{SessionId, SessionStatus, SessionView, StartSessionRequest},
};
use serde::{Deserialize, Serialize};

use super::{AppState, error::ApiError, extract::ApiJson};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendSessionRequest {
    pub additional_minutes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendSessionResponse {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionResponse {
    pub ok: bool,
    pub session_id: SessionId,
}

/// `POST /session/start`
pub async fn start_session(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(request): ApiJson<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let session = state.live.sessions.start(user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(session.view())))
}

/// `POST /session/end`
pub async fn end_session(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<EndSessionResponse>, ApiError> {
    let session = state.live.sessions.end(user_id).await?;
    Ok(Json(EndSessionResponse {
        ok: true,
        session_id: session.id,
    }))
}

/// `POST /session/extend`
pub async fn extend_session(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    ApiJson(request): ApiJson<ExtendSessionRequest>,
) -> Result<Json<ExtendSessionResponse>, ApiError> {
    let session = state
        .live
        .sessions
        .extend(user_id, request.additional_minutes)
        .await?;
    Ok(Json(ExtendSessionResponse {
        expires_at: session.expires_at,
    }))
}

/// `GET /session`
pub async fn session_status(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(state.live.sessions.status(user_id).await?))
}
