// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signaling WebSocket message types.

use serde::{Deserialize, Serialize};

use skein_core::error::ErrorCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    JoinRoom {
        room_id: String,
    },
    /// Owner-only; carries the broadcaster's SDP offer.
    StartBroadcast {
        offer: String,
    },
    IceCandidate {
        candidate: String,
        #[serde(default)]
        sdp_mid: Option<String>,
        #[serde(default)]
        sdp_mline_index: Option<u16>,
    },
    StopBroadcast {},
    LeaveRoom {},
    Ping {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    RoomJoined {
        room_id: String,
        is_live: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hls_url: Option<String>,
    },
    /// SDP answer from the media worker.
    BroadcastStarted {
        room_id: String,
        answer: String,
    },
    IceCandidate {
        candidate: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_mline_index: Option<u16>,
    },
    /// Playback URL fan-out; an absent URL means the stream ended.
    StreamAvailable {
        room_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hls_url: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
    Pong {},
}

/// Build an error frame from a shared error code.
pub fn ws_error(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.as_str().to_owned(), message: message.to_owned() }
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
