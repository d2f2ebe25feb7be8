//! Access middleware for live-mode endpoints.
//!
//! Validates the bearer token, runs the eligibility gate and injects the
//! caller's user ID into request extensions for downstream handlers.
//!
//! # Extracting User ID
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//!
//! async fn protected_handler(Extension(user_id): Extension<i64>) -> String {
//!     format!("Authenticated as user {}", user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use live_match::profile::UserId;

use super::{AppState, error::ApiError};
use crate::{logging::log_security_event, metrics};

/// Resolve a raw token to an eligible caller
///
/// # Errors
///
/// * `401` - Token missing, malformed or expired
/// * `403` - Token valid but the account is not eligible for live mode
pub async fn authorize(state: &AppState, token: &str) -> Result<UserId, ApiError> {
    let claims = state.tokens.verify(token).map_err(|e| {
        log_security_event("invalid_token", None, &e.to_string());
        ApiError::unauthorized()
    })?;

    if let Err(reason) = state.gate.check(&claims).await {
        log_security_event(reason.code(), Some(claims.sub), &reason.to_string());
        metrics::eligibility_rejections_total(reason.code());
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            reason.code(),
            reason.to_string(),
        ));
    }

    Ok(claims.sub)
}

/// Middleware gating every live-mode endpoint.
///
/// Expects `Authorization: Bearer <token>`.
///
/// - **Success**: injects `user_id: i64` into request extensions
/// - **Missing or invalid token**: `401 Unauthorized`
/// - **Ineligible account**: `403 Forbidden` with `PREMIUM_REQUIRED`,
///   `VERIFICATION_REQUIRED` or `CONSENT_REQUIRED`
pub async fn live_access_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthorized)?;

    let user_id = authorize(&state, token).await?;
    request.extensions_mut().insert(user_id);
    Ok(next.run(request).await)
}
