// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat WebSocket endpoint.
//!
//! auth → join_room(roomID, sessionID) → chat_message* → leave_room. Inbound
//! chat goes to the partitioned log only; delivery — including back to this
//! instance — arrives through the dispatcher's RPC, so one path serves local
//! and remote viewers alike.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use skein_core::clients::AuthedUser;
use skein_core::error::ErrorCode;
use skein_core::message::{content_within_limit, ChatMessage};

use super::roster::CLIENT_BUFFER;
use super::ws_msg::{ws_error, ClientMessage, ServerMessage};
use super::ChatHub;

struct Conn {
    client_id: String,
    user: Option<AuthedUser>,
    membership: Option<(String, String)>,
}

/// `GET /chat/ws` — WebSocket upgrade.
pub async fn ws_handler(
    State(hub): State<Arc<ChatHub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max = hub.config.max_frame_bytes;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_connection(hub, socket))
        .into_response()
}

async fn handle_connection(hub: Arc<ChatHub>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(CLIENT_BUFFER);

    let mut conn = Conn { client_id: next_client_id(), user: None, membership: None };
    hub.roster.attach(&conn.client_id, out_tx).await;

    let ping_interval = hub.config.ws.ping_interval();
    let pong_wait = hub.config.ws.pong_wait();
    let write_wait = hub.config.ws.write_wait();
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = hub.shutdown.cancelled() => break,
            _ = ping.tick() => {
                if last_seen.elapsed() > pong_wait {
                    debug!(client_id = %conn.client_id, "pong timeout, closing");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                let send = tokio::time::timeout(
                    write_wait,
                    ws_tx.send(Message::Text(frame.into())),
                );
                match send.await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                last_seen = Instant::now();
                match msg {
                    Message::Text(text) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                if send_reply(&mut ws_tx, &ws_error(ErrorCode::BadRequest, "invalid message")).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if let Some(reply) = handle_client_message(&hub, &mut conn, client_msg).await {
                            if send_reply(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    hub.detach(&conn.client_id, conn.membership.take()).await;
}

async fn handle_client_message(
    hub: &Arc<ChatHub>,
    conn: &mut Conn,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Auth { token } => match hub.auth.validate(&token).await {
            Ok(Some(user)) => {
                let user_id = user.user_id.clone();
                conn.user = Some(user);
                Some(ServerMessage::AuthResult { success: true, user_id: Some(user_id) })
            }
            Ok(None) => Some(ServerMessage::AuthResult { success: false, user_id: None }),
            Err(e) => {
                warn!(err = %e, "auth service unreachable");
                Some(ws_error(ErrorCode::Internal, "authentication unavailable"))
            }
        },

        ClientMessage::JoinRoom { room_id, session_id } => {
            if conn.user.is_none() {
                return Some(ws_error(ErrorCode::Unauthorized, "not authenticated"));
            }
            if conn.membership.is_some() {
                return Some(ws_error(ErrorCode::BadRequest, "already in a room"));
            }
            hub.join(&conn.client_id, &room_id, &session_id).await;
            conn.membership = Some((room_id.clone(), session_id.clone()));
            Some(ServerMessage::RoomJoined { room_id, session_id })
        }

        ClientMessage::ChatMessage { content } => {
            let Some(ref user) = conn.user else {
                return Some(ws_error(ErrorCode::Unauthorized, "not authenticated"));
            };
            let Some((ref room_id, ref session_id)) = conn.membership else {
                return Some(ws_error(ErrorCode::BadRequest, "join a room first"));
            };
            if !content_within_limit(&content, hub.config.max_content_bytes) {
                return Some(ws_error(ErrorCode::BadRequest, "message empty or too large"));
            }

            let message_id = match hub.ids.next(room_id, session_id).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(room_id, err = %e, "id allocation failed");
                    return Some(ws_error(ErrorCode::Unavailable, "try again"));
                }
            };
            let message = ChatMessage::new(
                message_id,
                &user.user_id,
                &user.username,
                room_id,
                session_id,
                &content,
            );
            if let Err(e) = hub.producer.produce(&message).await {
                warn!(room_id, err = %e, "chat log produce failed");
                return Some(ws_error(ErrorCode::Unavailable, "message not accepted"));
            }
            None
        }

        ClientMessage::LeaveRoom {} => {
            if let Some((room_id, session_id)) = conn.membership.take() {
                hub.leave(&conn.client_id, &room_id, &session_id).await;
            }
            None
        }

        ClientMessage::Ping {} => Some(ServerMessage::Pong {}),
    }
}

async fn send_reply<S>(tx: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

fn next_client_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{ts:x}-{n}")
}
