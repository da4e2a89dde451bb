// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat WebSocket message types. Inbound chat frames carry only content; the
//! hub assigns the message ID and timestamps, and the outbound chat frame is
//! the [`skein_core::message::ChatMessage`] wire format itself.

use serde::{Deserialize, Serialize};

use skein_core::error::ErrorCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { token: String },
    JoinRoom { room_id: String, session_id: String },
    ChatMessage { content: String },
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
        session_id: String,
    },
    Error {
        code: String,
        message: String,
    },
    Pong {},
}

pub fn ws_error(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.as_str().to_owned(), message: message.to_owned() }
}
