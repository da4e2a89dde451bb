// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signaling WebSocket endpoint and per-connection state machine.
//!
//! UNAUTH → (auth) → AUTH → (join_room) → IN_ROOM → (owner start_broadcast)
//! → BROADCASTING. An abrupt disconnect while broadcasting publishes
//! `stop_broadcast{reason="disconnect"}` — the distinct reason is what lets
//! presence hold the room live through a reconnect grace period.

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

use crate::state::{SignalState, CLIENT_BUFFER};
use crate::ws_msg::{ws_error, ClientMessage, ServerMessage};

/// Short-circuit: return an error frame if the client has not authenticated.
macro_rules! require_user {
    ($conn:expr) => {
        match $conn.user {
            Some(ref user) => user.clone(),
            None => return Some(ws_error(ErrorCode::Unauthorized, "not authenticated")),
        }
    };
}

/// Per-connection bookkeeping.
struct Conn {
    client_id: String,
    user: Option<skein_core::clients::AuthedUser>,
    room_id: Option<String>,
    broadcasting: bool,
}

/// `GET /ws` — WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<Arc<SignalState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max = state.config.max_frame_bytes;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_connection(state, socket))
        .into_response()
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<SignalState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER);

    let mut conn = Conn {
        client_id: next_client_id(),
        user: None,
        room_id: None,
        broadcasting: false,
    };

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
                // The loop holds a sender, so recv only fails on shutdown.
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

    // Cleanup. A broadcaster that vanished gets the disconnect reason so
    // presence can absorb the reconnect.
    if conn.broadcasting {
        if let Some(ref room_id) = conn.room_id {
            end_broadcast(&state, room_id, event::REASON_DISCONNECT, event::REASON_DISCONNECT)
                .await;
        }
    }
    if let Some(ref room_id) = conn.room_id {
        state.leave(room_id, &conn.client_id).await;
    }
}

/// Handle one client frame, optionally returning a direct reply.
async fn handle_client_message(
    state: &Arc<SignalState>,
    conn: &mut Conn,
    msg: ClientMessage,
    out_tx: &mpsc::Sender<ServerMessage>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Auth { token } => match state.auth.validate(&token).await {
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

        ClientMessage::JoinRoom { room_id } => {
            if conn.user.is_none() {
                return Some(ws_error(ErrorCode::Unauthorized, "not authenticated"));
            }
            if conn.room_id.is_some() {
                return Some(ws_error(ErrorCode::BadRequest, "already in a room"));
            }
            match state.rooms_dir.get_room(&room_id).await {
                Ok(Some(_)) => {}
                Ok(None) => return Some(ws_error(ErrorCode::NotFound, "room not found")),
                Err(e) => {
                    warn!(room_id, err = %e, "room directory unreachable");
                    return Some(ws_error(ErrorCode::Internal, "room lookup failed"));
                }
            }
            state.join(&room_id, &conn.client_id, out_tx.clone()).await;
            conn.room_id = Some(room_id.clone());
            let media = state.room_state(&room_id);
            Some(ServerMessage::RoomJoined {
                room_id,
                is_live: media.is_live,
                hls_url: media.hls_url,
            })
        }

        ClientMessage::StartBroadcast { offer } => {
            let user = require_user!(conn);
            let Some(room_id) = conn.room_id.clone() else {
                return Some(ws_error(ErrorCode::BadRequest, "join a room first"));
            };

            // Owner check against the room directory.
            match state.rooms_dir.get_room(&room_id).await {
                Ok(Some(record)) if record.owner_id == user.user_id => {}
                Ok(Some(_)) => {
                    return Some(ws_error(ErrorCode::Forbidden, "not the room owner"));
                }
                Ok(None) => return Some(ws_error(ErrorCode::NotFound, "room not found")),
                Err(e) => {
                    warn!(room_id, err = %e, "room directory unreachable");
                    return Some(ws_error(ErrorCode::Internal, "room lookup failed"));
                }
            }

            // Claim the room. One broadcaster at a time.
            {
                let Ok(mut tables) = state.tables.lock() else {
                    return Some(ws_error(ErrorCode::Internal, "state unavailable"));
                };
                if tables.active_broadcasts.contains_key(&room_id) {
                    return Some(ws_error(ErrorCode::Conflict, "already streaming"));
                }
                tables.active_broadcasts.insert(room_id.clone(), conn.client_id.clone());
                tables.broadcaster_users.insert(room_id.clone(), user.user_id.clone());
            }

            // Hand the offer to the media plane. A publish failure on this
            // mutation path rolls the claim back.
            let start = Event::new(
                event::START_BROADCAST,
                &room_id,
                serde_json::json!({ "user_id": user.user_id, "offer": offer }),
            );
            if let Err(e) = state.bus.publish(&event::to_media(&room_id), &start).await {
                warn!(room_id, err = %e, "start_broadcast publish failed, rolling back");
                if let Ok(mut tables) = state.tables.lock() {
                    tables.active_broadcasts.remove(&room_id);
                    tables.broadcaster_users.remove(&room_id);
                }
                return Some(ws_error(ErrorCode::Internal, "media plane unavailable"));
            }

            // Lifecycle record is observability, not control flow.
            let started = Event::new(
                event::BROADCAST_STARTED,
                &room_id,
                serde_json::json!({ "broadcaster_id": user.user_id }),
            );
            if let Err(e) = state.bus.publish(&event::lifecycle(&room_id), &started).await {
                warn!(room_id, err = %e, "broadcast_started lifecycle publish failed");
            }

            conn.broadcasting = true;
            None
        }

        ClientMessage::IceCandidate { candidate, sdp_mid, sdp_mline_index } => {
            if !conn.broadcasting {
                return Some(ws_error(ErrorCode::BadRequest, "not broadcasting"));
            }
            let Some(room_id) = conn.room_id.clone() else { return None };
            let ice = Event::new(
                event::ICE_CANDIDATE,
                &room_id,
                serde_json::json!({
                    "candidate": candidate,
                    "sdp_mid": sdp_mid,
                    "sdp_mline_index": sdp_mline_index,
                }),
            );
            if let Err(e) = state.bus.publish(&event::to_media(&room_id), &ice).await {
                debug!(room_id, err = %e, "ice candidate publish failed");
            }
            None
        }

        ClientMessage::StopBroadcast {} => {
            if !conn.broadcasting {
                return Some(ws_error(ErrorCode::BadRequest, "not broadcasting"));
            }
            if let Some(room_id) = conn.room_id.clone() {
                end_broadcast(state, &room_id, "manual", event::REASON_EXPLICIT).await;
            }
            conn.broadcasting = false;
            None
        }

        ClientMessage::LeaveRoom {} => {
            if let Some(room_id) = conn.room_id.take() {
                if conn.broadcasting {
                    end_broadcast(state, &room_id, "manual", event::REASON_EXPLICIT).await;
                    conn.broadcasting = false;
                }
                state.leave(&room_id, &conn.client_id).await;
            }
            None
        }

        ClientMessage::Ping {} => Some(ServerMessage::Pong {}),
    }
}

/// Release a room's broadcast claim and notify the media plane and the
/// lifecycle topic. `media_reason` rides the media channel; `lifecycle_reason`
/// decides whether presence applies the grace period.
pub(crate) async fn end_broadcast(
    state: &SignalState,
    room_id: &str,
    media_reason: &str,
    lifecycle_reason: &str,
) {
    if let Ok(mut tables) = state.tables.lock() {
        tables.active_broadcasts.remove(room_id);
        tables.broadcaster_users.remove(room_id);
    }

    let stop =
        Event::new(event::STOP_BROADCAST, room_id, serde_json::json!({ "reason": media_reason }));
    if let Err(e) = state.bus.publish(&event::to_media(room_id), &stop).await {
        // The worker also notices the dead peer, so this is not fatal.
        warn!(room_id, err = %e, "stop_broadcast publish failed");
    }

    let stopped = Event::new(
        event::BROADCAST_STOPPED,
        room_id,
        serde_json::json!({ "reason": lifecycle_reason }),
    );
    if let Err(e) = state.bus.publish(&event::lifecycle(room_id), &stopped).await {
        warn!(room_id, err = %e, "broadcast_stopped lifecycle publish failed");
    }
}

/// Send a JSON-serialized frame, bounded by the write timeout.
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

/// Generate a unique client ID (not cryptographic, just for tracking).
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
