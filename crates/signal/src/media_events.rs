// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber for `media:room:*:to_signal`.
//!
//! Forwards SDP answers and server ICE candidates to the room's broadcaster,
//! fans `stream_available` out to every viewer when the worker reports the
//! playlist ready, and clears state when the stream ends.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use skein_core::event::{self, Event};

use crate::state::{RoomMediaState, SignalState};
use crate::ws_msg::ServerMessage;

/// Spawn the media-event subscriber as a background task.
pub fn spawn(state: Arc<SignalState>) {
    tokio::spawn(async move {
        if let Err(e) = run(state).await {
            error!(err = %e, "media event subscriber failed");
        }
    });
}

async fn run(state: Arc<SignalState>) -> anyhow::Result<()> {
    let mut sub = state
        .bus
        .subscribe_pattern("media:room:*:to_signal")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("subscribed to media events");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = sub.recv() => {
                let Some(event) = event else { break };
                handle_media_event(&state, event).await;
            }
        }
    }
    Ok(())
}

async fn handle_media_event(state: &SignalState, event: Event) {
    let room_id = event.room_id.clone();
    match event.kind.as_str() {
        event::BROADCAST_ANSWER => {
            let answer = event.payload_str("answer").to_owned();
            let Some(client_id) = state.broadcaster_of(&room_id) else {
                debug!(room_id, "answer for a room with no active broadcaster");
                return;
            };
            let msg = ServerMessage::BroadcastStarted { room_id: room_id.clone(), answer };
            if !state.send_to(&room_id, &client_id, msg).await {
                debug!(room_id, client_id, "broadcaster gone before answer arrived");
            }
        }

        event::SERVER_ICE_CANDIDATE => {
            let Some(client_id) = state.broadcaster_of(&room_id) else { return };
            let msg = ServerMessage::IceCandidate {
                candidate: event.payload_str("candidate").to_owned(),
                sdp_mid: event
                    .payload
                    .get("sdp_mid")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned),
                sdp_mline_index: event
                    .payload
                    .get("sdp_mline_index")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u16),
            };
            let _ = state.send_to(&room_id, &client_id, msg).await;
        }

        event::STREAM_READY => {
            let hls_url = event.payload_str("hls_url").to_owned();
            if let Ok(mut tables) = state.tables.lock() {
                tables.room_states.insert(
                    room_id.clone(),
                    RoomMediaState { is_live: true, hls_url: Some(hls_url.clone()) },
                );
            }
            info!(room_id, hls_url, "stream ready");
            let msg = ServerMessage::StreamAvailable {
                room_id: room_id.clone(),
                hls_url: Some(hls_url),
            };
            state.broadcast_room(&room_id, &msg).await;
        }

        event::STREAM_ENDED => {
            if let Ok(mut tables) = state.tables.lock() {
                tables.room_states.remove(&room_id);
                tables.active_broadcasts.remove(&room_id);
                tables.broadcaster_users.remove(&room_id);
            }
            info!(room_id, "stream ended");
            let msg = ServerMessage::StreamAvailable { room_id: room_id.clone(), hls_url: None };
            state.broadcast_room(&room_id, &msg).await;
        }

        other => {
            warn!(room_id, kind = other, "unknown media event");
        }
    }
}

#[cfg(test)]
#[path = "media_events_tests.rs"]
mod tests;
