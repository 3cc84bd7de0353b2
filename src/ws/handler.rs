//! WebSocket upgrade handler

use std::fmt::Display;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    Sink, SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::verify_jwt;
use crate::matchmaking::MatchmakingError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::hub::{Outbound, Transport};
use crate::ws::protocol::{ClientMsg, ConnectionId, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler
///
/// Unauthenticated clients are upgraded too, told why, and closed.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let token = query.token.unwrap_or_default();

    match verify_jwt(&token, &state.config.supabase_jwt_secret) {
        Ok(claims) => {
            info!(user_id = %claims.sub, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            ws.on_upgrade(reject_socket)
        }
    }
}

async fn reject_socket(mut socket: WebSocket) {
    let error = ServerMsg::Error {
        reason: MatchmakingError::Unauthorized.to_string(),
    };
    if let Err(e) = send_msg(&mut socket, &error).await {
        debug!(error = %e, "Failed to send auth error");
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let connection = ConnectionId::new();
    info!(user_id = %user_id, conn = %connection, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let outbound_rx = state.hub.register(connection, user_id);

    if let Err(e) = state.matchmaking.on_connect(connection, user_id) {
        // Error and close are already queued for the writer
        state.matchmaking.reject(connection, &e);
        write_outbound(connection, ws_sink, outbound_rx).await;
        state.hub.unregister(connection);
        return;
    }

    let mut writer = tokio::spawn(write_outbound(connection, ws_sink, outbound_rx));

    tokio::select! {
        _ = read_inbound(connection, user_id, ws_stream, &state) => {}
        _ = &mut writer => {
            debug!(conn = %connection, "Server closed the connection");
        }
    }
    writer.abort();

    if let Some(result) = state.matchmaking.on_disconnect(connection, user_id).await {
        info!(
            user_id = %user_id,
            room_id = %result.room_id,
            winner_id = %result.winner_id,
            "Disconnect ended a match"
        );
    }
    state.hub.unregister(connection);

    info!(user_id = %user_id, conn = %connection, "WebSocket connection closed");
}

/// Writer task: outbound queue -> WebSocket
async fn write_outbound(
    connection: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Message(msg) => {
                if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                    debug!(conn = %connection, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Outbound::Close => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Reader loop: WebSocket -> matchmaking service
async fn read_inbound(
    connection: ConnectionId,
    user_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => {
                    let allowed = match msg {
                        ClientMsg::KeyPressed { .. } => rate_limiter.check_input(),
                        _ => rate_limiter.check_lobby(),
                    };
                    if !allowed {
                        warn!(user_id = %user_id, "Rate limited client message");
                        continue;
                    }

                    state.matchmaking.handle(connection, user_id, msg).await;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                    state.hub.send(
                        connection,
                        ServerMsg::Error {
                            reason: "Malformed message".to_string(),
                        },
                    );
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg<S>(sink: &mut S, msg: &ServerMsg) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
