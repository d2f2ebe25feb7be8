//! WebSocket stream of the caller's live events.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws/events?token=<jwt_token>`
//! 2. Server validates the token and runs the eligibility gate
//! 3. Server spawns a send task forwarding the caller's events from the
//!    event bus, plus responses to client commands
//! 4. The receive loop handles client commands until the socket closes
//!
//! # Client Messages
//!
//! ```json
//! {"type": "accept", "match_id": "…"}
//! {"type": "decline", "match_id": "…"}
//! {"type": "ping"}
//! ```
//!
//! # Server Messages
//!
//! - **Live events**: `session_started`, `session_extended`, `session_ended`,
//!   `match_created`, `match_declined`, `match_accepted`
//! - **Command responses**: `success`, `error`, `pong`

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use live_match::{matching::MatchId, profile::UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use super::{AppState, error::ApiError, middleware::authorize};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Client messages received via WebSocket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Accept { match_id: MatchId },
    Decline { match_id: MatchId },
    Ping,
}

/// Response messages sent to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerResponse {
    Success { message: String },
    Error { code: &'static str, message: String },
    Pong,
}

impl From<ApiError> for ServerResponse {
    fn from(err: ApiError) -> Self {
        ServerResponse::Error {
            code: err.code,
            message: err.message,
        }
    }
}

/// Upgrade to a WebSocket streaming the caller's live events.
///
/// Returns the same `401`/`403` errors as the HTTP endpoints when the token
/// is invalid or the account is not eligible.
pub async fn events_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match authorize(&state, &query.token).await {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    metrics::websocket_connected();
    info!(user_id, "Event stream connected");

    let mut events = state.live.events().subscribe();
    let (response_tx, mut response_rx) = mpsc::channel::<String>(32);

    let send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                received = events.recv() => match received {
                    Ok(event) if event.is_for(user_id) => match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize live event: {}", e);
                            continue;
                        }
                    },
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(user_id, skipped, "Event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(response) = response_rx.recv() => response,
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            metrics::websocket_messages_sent();
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => handle_client_message(client_msg, user_id, &state).await,
                    Err(e) => {
                        debug!("Failed to parse client message: {}", e);
                        ServerResponse::Error {
                            code: "INVALID_MESSAGE",
                            message: "Invalid message format".to_string(),
                        }
                    }
                };

                if let Ok(json) = serde_json::to_string(&response)
                    && response_tx.send(json).await.is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    metrics::websocket_disconnected();
    info!(user_id, "Event stream disconnected");
}

async fn handle_client_message(
    msg: ClientMessage,
    user_id: UserId,
    state: &AppState,
) -> ServerResponse {
    match msg {
        ClientMessage::Accept { match_id } => {
            match state.live.matches.accept(user_id, match_id).await {
                Ok(_) => ServerResponse::Success {
                    message: format!("Accepted match {match_id}"),
                },
                Err(e) => ApiError::from(e).into(),
            }
        }
        ClientMessage::Decline { match_id } => {
            match state.live.matches.decline(user_id, match_id).await {
                Ok(_) => ServerResponse::Success {
                    message: format!("Declined match {match_id}"),
                },
                Err(e) => ApiError::from(e).into(),
            }
        }
        ClientMessage::Ping => ServerResponse::Pong,
    }
}
