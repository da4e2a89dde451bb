// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelope and channel grammar for the event bus.
//!
//! Channels are addressed as `{producer}:room:{roomID}:to_{target}`. The
//! pattern form replaces the room component with `*` and matches every room
//! of a producer↔consumer pair. A channel maps onto a log topic
//! `{producer}-to-{target}` keyed by the room ID, or onto a fan-out subject
//! `{producer}.room.{roomID}.to_{target}`.

use serde::{Deserialize, Serialize};

use crate::bus::BusError;

/// Event kinds on the signal→media channel.
pub const START_BROADCAST: &str = "start_broadcast";
pub const ICE_CANDIDATE: &str = "ice_candidate";
pub const STOP_BROADCAST: &str = "stop_broadcast";

/// Event kinds on the media→signal channel.
pub const BROADCAST_ANSWER: &str = "broadcast_answer";
pub const SERVER_ICE_CANDIDATE: &str = "server_ice_candidate";
pub const STREAM_READY: &str = "stream_ready";
pub const STREAM_ENDED: &str = "stream_ended";

/// Event kinds on the broadcast-lifecycle channel.
pub const BROADCAST_STARTED: &str = "broadcast_started";
pub const BROADCAST_STOPPED: &str = "broadcast_stopped";

/// Event kind on the presence count-update channel.
pub const COUNT_UPDATE: &str = "count_update";

/// Stop reasons carried by `stop_broadcast` / `broadcast_stopped` payloads.
/// Presence applies a grace period only to `disconnect`.
pub const REASON_EXPLICIT: &str = "explicit";
pub const REASON_DISCONNECT: &str = "disconnect";

/// The unit traversing the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub room_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Publish time, unix millis.
    pub timestamp: u64,
}

impl Event {
    pub fn new(kind: &str, room_id: &str, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.to_owned(),
            room_id: room_id.to_owned(),
            payload,
            timestamp: crate::epoch_ms(),
        }
    }

    /// Read a string field out of the payload, empty if absent.
    pub fn payload_str(&self, field: &str) -> &str {
        self.payload.get(field).and_then(|v| v.as_str()).unwrap_or_default()
    }
}

/// The room component of a parsed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomPart {
    Exact(String),
    Any,
}

/// A validated channel address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddr {
    pub producer: String,
    pub room: RoomPart,
    pub target: String,
}

impl ChannelAddr {
    /// Parse `{producer}:room:{roomID}:to_{target}`. The room component `*`
    /// yields a pattern address.
    pub fn parse(channel: &str) -> Result<Self, BusError> {
        let parts: Vec<&str> = channel.split(':').collect();
        let [producer, room_lit, room, to_target] = parts.as_slice() else {
            return Err(BusError::BadChannel(channel.to_owned()));
        };
        let target = to_target.strip_prefix("to_").unwrap_or_default();
        if producer.is_empty() || *room_lit != "room" || room.is_empty() || target.is_empty() {
            return Err(BusError::BadChannel(channel.to_owned()));
        }
        let room = if *room == "*" { RoomPart::Any } else { RoomPart::Exact((*room).to_owned()) };
        Ok(Self { producer: (*producer).to_owned(), room, target: target.to_owned() })
    }

    /// Log topic for this address: `{producer}-to-{target}`.
    pub fn topic(&self) -> String {
        format!("{}-to-{}", self.producer, self.target)
    }

    /// Message key for the log substrate; `None` for pattern addresses.
    pub fn key(&self) -> Option<&str> {
        match &self.room {
            RoomPart::Exact(room) => Some(room),
            RoomPart::Any => None,
        }
    }

    /// Fan-out subject: `{producer}.room.{roomID}.to_{target}`, with `*` as
    /// the room token for pattern addresses.
    pub fn subject(&self) -> String {
        let room = match &self.room {
            RoomPart::Exact(room) => room.as_str(),
            RoomPart::Any => "*",
        };
        format!("{}.room.{}.to_{}", self.producer, room, self.target)
    }

    /// Render back to channel form.
    pub fn channel(&self) -> String {
        let room = match &self.room {
            RoomPart::Exact(room) => room.as_str(),
            RoomPart::Any => "*",
        };
        format!("{}:room:{}:to_{}", self.producer, room, self.target)
    }
}

/// Channel to the media worker for one room.
pub fn to_media(room_id: &str) -> String {
    format!("signal:room:{room_id}:to_media")
}

/// Channel back to the signaling plane for one room.
pub fn to_signal(room_id: &str) -> String {
    format!("media:room:{room_id}:to_signal")
}

/// Broadcast-lifecycle channel for one room (consumed by presence).
pub fn lifecycle(room_id: &str) -> String {
    format!("broadcast:room:{room_id}:to_presence")
}

/// Presence count-update channel for one room.
pub fn count_channel(room_id: &str) -> String {
    format!("presence:room:{room_id}:to_count")
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
