// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat message wire format.
//!
//! This exact JSON shape travels the chat log, the delivery RPC, and the
//! client WebSocket, so producers and consumers on every side of the pipeline
//! parse one struct.

use serde::{Deserialize, Serialize};

fn chat_message_kind() -> String {
    "chat_message".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    #[serde(rename = "type", default = "chat_message_kind")]
    pub kind: String,
    /// Monotonic, k-sortable within `(room_id, session_id)`; assigned once by
    /// the ID allocator before the message is produced.
    pub message_id: i64,
    pub user_id: String,
    pub username: String,
    pub room_id: String,
    pub session_id: String,
    pub content: String,
    /// Creation time, unix millis UTC.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(
        message_id: i64,
        user_id: &str,
        username: &str,
        room_id: &str,
        session_id: &str,
        content: &str,
    ) -> Self {
        Self {
            kind: chat_message_kind(),
            message_id,
            user_id: user_id.to_owned(),
            username: username.to_owned(),
            room_id: room_id.to_owned(),
            session_id: session_id.to_owned(),
            content: content.to_owned(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Whether `content` fits the configured byte cap. Measured in bytes, not
/// characters — the cap bounds frame and row sizes, not reading length.
pub fn content_within_limit(content: &str, max_bytes: usize) -> bool {
    !content.is_empty() && content.len() <= max_bytes
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
