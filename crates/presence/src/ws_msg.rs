// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence WebSocket message types.

use serde::{Deserialize, Serialize};

use skein_core::error::ErrorCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join with either a bearer token (authenticated) or a device hash
    /// (anonymous). One of the two is required.
    Join {
        room_id: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        device_hash: Option<String>,
    },
    Leave {
        room_id: String,
    },
    Ping {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined { room_id: String, count: u64 },
    Count { room_id: String, count: u64 },
    Pong {},
    Error { code: String, message: String },
}

pub fn ws_error(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.as_str().to_owned(), message: message.to_owned() }
}
