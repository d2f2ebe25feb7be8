//! HTTP/WebSocket API for live matching.
//!
//! # Modules
//!
//! - [`auth`]: Access-token verification and the eligibility gate
//! - [`middleware`]: Gate applied to every live-mode endpoint
//! - [`profile`]: Live profile, photo and preference endpoints
//! - [`session`]: Start, extend, end and inspect live sessions
//! - [`matches`]: Current match, decline/accept and nearby count
//! - [`websocket`]: Per-user live event stream
//! - [`photos`]: Signed photo downloads
//!
//! # Endpoints Overview
//!
//! ```text
//! GET   /health                   - Store reachability (public)
//! GET   /photos/{*key}            - Signed photo download (signature in query)
//! GET   /ws/events?token=<jwt>    - Live event stream
//!
//! POST  /profile                  - Create live profile
//! GET   /profile                  - Get live profile
//! PATCH /profile                  - Update description
//! POST  /profile/photo            - Upload photo (multipart `photo`)
//! POST  /preferences              - Create preferences
//! GET   /preferences              - Get preferences
//! PATCH /preferences              - Update preferences
//! POST  /session/start            - Start a live session
//! POST  /session/end              - End the active session
//! POST  /session/extend           - Extend the active session
//! GET   /session                  - Session status
//! POST  /match/decline            - Decline the current match
//! POST  /match/accept             - Accept the current match
//! GET   /match/current            - What the caller currently sees
//! GET   /nearby/count             - Approximate nearby count
//! ```
//!
//! Every endpoint except health, photos and the WebSocket (which checks
//! its query token itself) sits behind [`middleware::live_access_middleware`].
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod auth;
pub mod error;
pub mod extract;
pub mod matches;
pub mod middleware;
pub mod photos;
pub mod profile;
pub mod request_id;
pub mod session;
pub mod websocket;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use live_match::LiveMatch;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::storage::LocalPhotoStorage;
use auth::{EligibilityGate, TokenVerifier};

/// Room for multipart framing around the photo itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all HTTP handlers and WebSocket connections.
///
/// Cloned for each request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub live: Arc<LiveMatch>,
    pub tokens: Arc<TokenVerifier>,
    pub gate: Arc<dyn EligibilityGate>,
    pub photos: Arc<LocalPhotoStorage>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use lm_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let photo_limit = state.live.config().max_photo_bytes + MULTIPART_OVERHEAD_BYTES;

    let protected_routes = Router::new()
        .route(
            "/profile",
            post(profile::create_profile)
                .get(profile::get_profile)
                .patch(profile::update_profile),
        )
        .route(
            "/profile/photo",
            post(profile::upload_photo).layer(DefaultBodyLimit::max(photo_limit)),
        )
        .route(
            "/preferences",
            post(profile::create_preferences)
                .get(profile::get_preferences)
                .patch(profile::update_preferences),
        )
        .route("/session", get(session::session_status))
        .route("/session/start", post(session::start_session))
        .route("/session/end", post(session::end_session))
        .route("/session/extend", post(session::extend_session))
        .route("/match/current", get(matches::current_match))
        .route("/match/decline", post(matches::decline_match))
        .route("/match/accept", post(matches::accept_match))
        .route("/nearby/count", get(matches::nearby_count))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::live_access_middleware,
        ));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/photos/{*key}", get(photos::get_photo))
        // WebSocket route handles its own auth via query parameter
        .route("/ws/events", get(websocket::events_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","store":true,"eventSubscribers":1,"timestamp":"2026-10-19T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = match state.live.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            false
        }
    };

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "eventSubscribers": state.live.events().subscriber_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
