// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence WebSocket endpoint.
//!
//! Joins and leaves mutate the shared store and publish a count update to the
//! bus; the fan-out subscriber then broadcasts the new count to every local
//! client — including on the instance that originated the change, so one
//! delivery path covers self and remote visibility. Pings double as store
//! heartbeats, refreshing the entry TTL.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use skein_core::error::ErrorCode;
use skein_core::event::{self, Event};

use crate::state::{PresenceState, CLIENT_BUFFER};
use crate::store::Identity;
use crate::ws_msg::{ws_error, ClientMessage, ServerMessage};

struct Conn {
    client_id: String,
    room_id: Option<String>,
    identity: Option<Identity>,
}

/// `GET /presence/ws` — WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<Arc<PresenceState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max = state.config.max_frame_bytes;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_connection(state, socket))
        .into_response()
}

async fn handle_connection(state: Arc<PresenceState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER);

    let mut conn = Conn { client_id: next_client_id(), room_id: None, identity: None };

    let ping_interval = state.config.ws.ping_interval();
    let pong_wait = state.config.ws.pong_wait();
    let write_wait = state.config.ws.write_wait();
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ping.tick() => {
                if last_seen.elapsed() > pong_wait {
                    debug!(client_id = %conn.client_id, "pong timeout, closing");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = out_rx.recv() => {
                let Some(msg) = msg else { break };
                if send_json(&mut ws_tx, &msg, write_wait).await.is_err() {
                    break;
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
                                let err = ws_error(ErrorCode::BadRequest, "invalid message");
                                if send_json(&mut ws_tx, &err, write_wait).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if let Some(reply) =
                            handle_client_message(&state, &mut conn, client_msg, &out_tx).await
                        {
                            if send_json(&mut ws_tx, &reply, write_wait).await.is_err() {
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

    // Disconnect counts as a leave.
    if let (Some(room_id), Some(identity)) = (conn.room_id.take(), conn.identity.take()) {
        depart(&state, &room_id, &conn.client_id, &identity).await;
    }
}

async fn handle_client_message(
    state: &Arc<PresenceState>,
    conn: &mut Conn,
    msg: ClientMessage,
    out_tx: &mpsc::Sender<ServerMessage>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Join { room_id, token, device_hash } => {
            if conn.room_id.is_some() {
                return Some(ws_error(ErrorCode::BadRequest, "already joined"));
            }

            let identity = match (token, device_hash) {
                (Some(token), _) => match state.auth.validate(&token).await {
                    Ok(Some(user)) => Identity::Auth { user_id: user.user_id },
                    Ok(None) => {
                        return Some(ws_error(ErrorCode::Unauthorized, "invalid token"));
                    }
                    Err(e) => {
                        warn!(err = %e, "auth service unreachable");
                        return Some(ws_error(ErrorCode::Internal, "authentication unavailable"));
                    }
                },
                (None, Some(device_hash)) if !device_hash.is_empty() => {
                    Identity::Anon { device_hash }
                }
                _ => return Some(ws_error(ErrorCode::BadRequest, "token or device_hash required")),
            };

            let count = match state.store.join(&room_id, &identity).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(room_id, err = %e, "presence join failed");
                    return Some(ws_error(ErrorCode::Unavailable, "presence store unavailable"));
                }
            };

            state.join(&room_id, &conn.client_id, out_tx.clone()).await;
            conn.room_id = Some(room_id.clone());
            conn.identity = Some(identity);

            publish_count(state, &room_id, count).await;
            Some(ServerMessage::Joined { room_id, count })
        }

        ClientMessage::Leave { room_id } => {
            if conn.room_id.as_deref() != Some(room_id.as_str()) {
                return Some(ws_error(ErrorCode::BadRequest, "not in that room"));
            }
            let identity = conn.identity.take()?;
            conn.room_id = None;
            depart(state, &room_id, &conn.client_id, &identity).await;
            None
        }

        ClientMessage::Ping {} => {
            if let Some(ref identity) = conn.identity {
                if let Err(e) = state.store.heartbeat(identity).await {
                    debug!(err = %e, "heartbeat refresh failed");
                }
            }
            Some(ServerMessage::Pong {})
        }
    }
}

/// Shared leave/disconnect path: store removal, roster removal, count publish.
async fn depart(state: &PresenceState, room_id: &str, client_id: &str, identity: &Identity) {
    state.leave(room_id, client_id).await;
    match state.store.leave(room_id, identity).await {
        Ok(count) => publish_count(state, room_id, count).await,
        Err(e) => warn!(room_id, err = %e, "presence leave failed"),
    }
}

/// Count updates ride the fan-out substrate; a publish failure only delays
/// convergence until the next update or periodic refresh.
pub(crate) async fn publish_count(state: &PresenceState, room_id: &str, count: u64) {
    let update = Event::new(event::COUNT_UPDATE, room_id, serde_json::json!({ "count": count }));
    if let Err(e) = state.bus.publish(&event::count_channel(room_id), &update).await {
        warn!(room_id, err = %e, "count update publish failed");
    }
}

async fn send_json<S>(
    tx: &mut S,
    msg: &ServerMessage,
    write_wait: std::time::Duration,
) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    tokio::time::timeout(write_wait, tx.send(Message::Text(text.into())))
        .await
        .map_err(|_| ())?
        .map_err(|_| ())
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
