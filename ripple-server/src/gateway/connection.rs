use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message as WsFrame, WebSocketStream};
use tracing::{error, info, warn};

use super::protocol::{ClientEvent, ServerEvent};
use super::state::{chat_room, user_room};
use crate::auth;
use crate::db::now_ms;
use crate::error::ChatError;
use crate::models::input::{SendMessageInput, ValidateExt};
use crate::models::MessageType;
use crate::services::SendMessageParams;
use crate::state::AppState;

/// Seconds a new connection gets to present its credential.
const AUTH_TIMEOUT_SECS: u64 = 10;

/// Handle a single WebSocket connection from handshake to disconnect.
pub async fn handle_connection(ws_stream: WebSocketStream<TcpStream>, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Unauthenticated -> Authenticating: the first frame must carry a
    // valid token or the connection never reaches Joined.
    let user_id = match wait_for_connect(&mut ws_receiver, &state.config.auth_secret).await {
        Ok(id) => id,
        Err(reason) => {
            warn!(reason = %reason, "Connection rejected before authentication");
            let event = ServerEvent::Error { message: reason };
            let _ = ws_sender.send(WsFrame::Text(event.to_json().into())).await;
            let _ = ws_sender.send(WsFrame::Close(None)).await;
            return;
        }
    };

    info!("User connected: {}", user_id);

    // Channel for pushing events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.gateway.add_client(user_id.clone(), tx.clone());

    let auth_ok = ServerEvent::AuthOk {
        user_id: user_id.clone(),
    };
    if let Err(e) = ws_sender
        .send(WsFrame::Text(auth_ok.to_json().into()))
        .await
    {
        error!("Failed to send auth confirmation to {}: {}", user_id, e);
    }

    // Forward queued events to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(WsFrame::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let user_id_clone = user_id.clone();
    let state_clone = state.clone();

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(WsFrame::Text(text))) => {
                        handle_event(&text, &user_id_clone, &state_clone, &tx);
                    }
                    Some(Ok(WsFrame::Close(_))) => {
                        info!("User {} sent close frame", user_id_clone);
                        break;
                    }
                    Some(Ok(WsFrame::Ping(_))) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error for user {}: {}", user_id_clone, e);
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended for user {}", user_id_clone);
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!("Send task finished for user {} (likely connection lost)", user_id_clone);
                break;
            }
        }
    }

    // Cleanup
    send_task.abort();
    let was_last = state.gateway.remove_client(&user_id);
    if was_last {
        let offline = ServerEvent::UserOffline {
            user_id: user_id.clone(),
            last_seen: now_ms(),
        };
        state.gateway.broadcast_all(&offline.to_json(), None);
    }

    info!("User disconnected: {}", user_id);
}

/// Wait for the `connect` frame and verify its token.
async fn wait_for_connect(
    receiver: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    secret: &str,
) -> Result<String, String> {
    let timeout = tokio::time::timeout(
        std::time::Duration::from_secs(AUTH_TIMEOUT_SECS),
        async {
            while let Some(result) = receiver.next().await {
                if let Ok(WsFrame::Text(text)) = result {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(ClientEvent::Connect { token }) => {
                            return match auth::verify_token(secret, &token) {
                                Ok(user_id) => Ok(user_id),
                                Err(e) => Err(e.public_message()),
                            };
                        }
                        Ok(_) => {
                            // Anything before connect is ignored, not fatal
                            warn!("Event received before authentication, ignoring");
                        }
                        Err(e) => {
                            warn!("Failed to parse handshake frame: {}", e);
                        }
                    }
                }
            }
            Err("connection closed before authentication".to_string())
        },
    );

    match timeout.await {
        Ok(result) => result,
        Err(_) => Err("authentication timeout".to_string()),
    }
}

/// Dispatch one inbound event from an authenticated connection.
///
/// Sender identity always comes from the connection, never the payload, so
/// a client cannot speak as anyone else. Persisting events go through the
/// services first and broadcast the persisted result; there is no
/// fire-and-forget echo path.
pub fn handle_event(
    text: &str,
    user_id: &str,
    state: &AppState,
    reply: &mpsc::UnboundedSender<String>,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(ev) => ev,
        Err(e) => {
            warn!("Failed to parse event from {}: {}", user_id, e);
            send_error(reply, "unrecognized event");
            return;
        }
    };

    if !state.gateway.limiter.check(user_id, now_ms()) {
        send_error(reply, &ChatError::RateLimited.public_message());
        return;
    }

    match event {
        ClientEvent::Connect { .. } => {
            // Already authenticated, ignore
        }
        ClientEvent::AuthJoin => match state.chats.get_user_chats(user_id) {
            Ok(chats) => {
                for chat in &chats {
                    state.gateway.join_room(&chat_room(&chat.id), user_id);
                }
                state.gateway.join_room(&user_room(user_id), user_id);

                let online = ServerEvent::UserOnline {
                    user_id: user_id.to_string(),
                };
                state.gateway.broadcast_all(&online.to_json(), Some(user_id));

                // Presence snapshot for the newcomer
                for other in state.gateway.online_users() {
                    if other != user_id {
                        let event = ServerEvent::UserOnline { user_id: other };
                        let _ = reply.send(event.to_json());
                    }
                }
            }
            Err(e) => send_error(reply, &e.public_message()),
        },
        ClientEvent::JoinChats { chat_ids } => {
            // Trusts ids the REST layer already authorized; see protocol doc
            for chat_id in &chat_ids {
                state.gateway.join_room(&chat_room(chat_id), user_id);
            }
        }
        ClientEvent::ChatJoin { chat_id } => {
            state.gateway.join_room(&chat_room(&chat_id), user_id);
        }
        ClientEvent::ChatLeave { chat_id } => {
            state.gateway.leave_room(&chat_room(&chat_id), user_id);
        }
        ClientEvent::SendMessage {
            chat_id,
            content,
            reply_to,
            temp_id,
        } => {
            let input = SendMessageInput {
                chat_id,
                content,
                message_type: None,
                reply_to,
                attachments: None,
            };
            if let Err(e) = input.validate_input() {
                send_error(reply, &e.public_message());
                return;
            }

            let params = SendMessageParams {
                chat_id: input.chat_id,
                content: input.content,
                message_type: MessageType::Text,
                reply_to: input.reply_to,
                attachments: Vec::new(),
            };

            match state.messages.create_message(user_id, params) {
                Ok(message) => {
                    let room = chat_room(&message.chat_id);
                    let event = ServerEvent::NewMessage { message, temp_id };
                    state.gateway.broadcast_to_room(&room, &event.to_json(), None);
                }
                Err(e) => send_error(reply, &e.public_message()),
            }
        }
        ClientEvent::EditMessage {
            message_id,
            content,
        } => match state.messages.update_message(&message_id, user_id, &content) {
            Ok(message) => {
                let room = chat_room(&message.chat_id);
                let event = ServerEvent::MessageUpdated { message };
                state.gateway.broadcast_to_room(&room, &event.to_json(), None);
            }
            Err(e) => send_error(reply, &e.public_message()),
        },
        ClientEvent::DeleteMessage { message_id } => {
            match state.messages.delete_message(&message_id, user_id) {
                Ok(message) => {
                    let room = chat_room(&message.chat_id);
                    let event = ServerEvent::MessageDeleted {
                        message_id: message.id,
                        chat_id: message.chat_id,
                    };
                    state.gateway.broadcast_to_room(&room, &event.to_json(), None);
                }
                Err(e) => send_error(reply, &e.public_message()),
            }
        }
        ClientEvent::Typing { chat_id } => {
            let event = ServerEvent::Typing {
                chat_id: chat_id.clone(),
                user_id: user_id.to_string(),
            };
            state
                .gateway
                .broadcast_to_room(&chat_room(&chat_id), &event.to_json(), Some(user_id));
        }
        ClientEvent::StopTyping { chat_id } => {
            let event = ServerEvent::StopTyping {
                chat_id: chat_id.clone(),
                user_id: user_id.to_string(),
            };
            state
                .gateway
                .broadcast_to_room(&chat_room(&chat_id), &event.to_json(), Some(user_id));
        }
        ClientEvent::MarkAsRead {
            message_id,
            // The message's own chat wins over whatever the payload claims.
            chat_id: _,
        } => match state.messages.mark_message_as_read(&message_id, user_id) {
            Ok(message) => {
                let seen_at = message
                    .seen_by
                    .iter()
                    .find(|s| s.user_id == user_id)
                    .map(|s| s.seen_at)
                    .unwrap_or_else(now_ms);
                let room = chat_room(&message.chat_id);
                let event = ServerEvent::MessageRead {
                    message_id: message.id,
                    chat_id: message.chat_id,
                    user_id: user_id.to_string(),
                    seen_at,
                };
                state.gateway.broadcast_to_room(&room, &event.to_json(), None);
            }
            Err(e) => send_error(reply, &e.public_message()),
        },
    }
}

fn send_error(reply: &mpsc::UnboundedSender<String>, message: &str) {
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    let _ = reply.send(event.to_json());
}
