use axum::{
    extract::{
        Query, State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::enums::Capability;
use crate::db::services::check_permission;
use crate::web::middleware::auth::decode_token;
use crate::web::models::AuthenticatedUser;
use crate::web::AppState;
use crate::websocket_models::{ClientCommand, ServerPush};

#[derive(Deserialize, Debug)]
pub struct WebSocketAuthQuery {
    token: Option<String>,
}

/// Upgrades an authenticated client to a WebSocket connection. The token
/// rides in the query string because browsers cannot set headers on
/// WebSocket handshakes.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<WebSocketAuthQuery>,
) -> impl IntoResponse {
    let Some(token) = query.token else {
        return crate::web::error::AppError::InvalidCredentials.into_response();
    };
    let user = match decode_token(&token, &app_state.config.jwt_secret) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user: AuthenticatedUser) {
    let connection_id = Uuid::new_v4();
    debug!(connection_id = %connection_id, username = %user.username, "websocket connected");

    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ServerPush>();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            Some(push) = push_rx.recv() => {
                match serde_json::to_string(&push) {
                    Ok(json) => {
                        if sink.send(Message::Text(Utf8Bytes::from(json))).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize websocket push"),
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&app_state, &user, connection_id, &push_tx, text.as_str())
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    app_state.registry.disconnect(connection_id);
    debug!(connection_id = %connection_id, "websocket disconnected");
}

async fn handle_command(
    app_state: &Arc<AppState>,
    user: &AuthenticatedUser,
    connection_id: Uuid,
    push_tx: &mpsc::UnboundedSender<ServerPush>,
    raw: &str,
) {
    let command = match serde_json::from_str::<ClientCommand>(raw) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable websocket command");
            return;
        }
    };

    match command {
        ClientCommand::Subscribe { channel } => {
            // Absence and denial both fail silently: the subscriber just
            // never receives events. Only malformed input is loud.
            match app_state.channels.get_by_name(&channel).await {
                Ok(Some(ch)) if check_permission(&ch, Capability::Join, user.role) => {
                    app_state
                        .registry
                        .join(&ch.name, connection_id, push_tx.clone());
                }
                Ok(_) => {
                    debug!(channel = %channel, "subscribe to absent or closed channel ignored");
                }
                Err(e) => {
                    warn!(error = %e, channel = %channel, "channel lookup failed during subscribe");
                }
            }
            let _ = push_tx.send(ServerPush::Subscribed { channel });
        }
        ClientCommand::Unsubscribe { channel } => {
            app_state.registry.leave(&channel, connection_id);
            let _ = push_tx.send(ServerPush::Unsubscribed { channel });
        }
        ClientCommand::Ping => {
            let _ = push_tx.send(ServerPush::Pong);
        }
    }
}
