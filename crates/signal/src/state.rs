// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared signaling state.
//!
//! The three coordination tables (`active_broadcasts`, `broadcaster_users`,
//! `room_states`) sit under one mutex and are only held for pointer-sized
//! mutations. The per-room client roster lives under its own RwLock;
//! broadcasts take the read side and iterate a snapshot of senders.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use skein_core::bus::EventBus;
use skein_core::clients::{AuthClient, RoomDirectory};

use crate::config::SignalConfig;
use crate::ws_msg::ServerMessage;

/// Per-client outbound buffer. A client that cannot drain this many frames
/// is dropped rather than allowed to block a room broadcast.
pub const CLIENT_BUFFER: usize = 64;

/// Last-known media state for a room, consulted on `join_room` so late
/// joiners learn about a live stream immediately.
#[derive(Debug, Clone, Default)]
pub struct RoomMediaState {
    pub is_live: bool,
    pub hls_url: Option<String>,
}

/// The three per-instance coordination tables, one lock.
#[derive(Debug, Default)]
pub struct Tables {
    /// roomID → clientID of the active broadcaster. At most one per room.
    pub active_broadcasts: HashMap<String, String>,
    /// roomID → userID of the broadcaster; the subject of lifecycle events.
    pub broadcaster_users: HashMap<String, String>,
    /// roomID → last-known media state.
    pub room_states: HashMap<String, RoomMediaState>,
}

/// Shared signaling service state.
pub struct SignalState {
    pub config: SignalConfig,
    pub bus: EventBus,
    pub auth: AuthClient,
    pub rooms_dir: RoomDirectory,
    pub tables: Mutex<Tables>,
    /// roomID → clientID → outbound sender.
    pub roster: RwLock<HashMap<String, HashMap<String, mpsc::Sender<ServerMessage>>>>,
    pub shutdown: CancellationToken,
}

impl SignalState {
    pub fn new(config: SignalConfig, bus: EventBus, shutdown: CancellationToken) -> Self {
        let auth = AuthClient::new(&config.auth_url);
        let rooms_dir = RoomDirectory::new(&config.rooms_url);
        Self {
            config,
            bus,
            auth,
            rooms_dir,
            tables: Mutex::new(Tables::default()),
            roster: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Add a client to a room roster.
    pub async fn join(&self, room_id: &str, client_id: &str, tx: mpsc::Sender<ServerMessage>) {
        let mut roster = self.roster.write().await;
        roster.entry(room_id.to_owned()).or_default().insert(client_id.to_owned(), tx);
    }

    /// Remove a client from a room roster.
    pub async fn leave(&self, room_id: &str, client_id: &str) {
        let mut roster = self.roster.write().await;
        if let Some(clients) = roster.get_mut(room_id) {
            clients.remove(client_id);
            if clients.is_empty() {
                roster.remove(room_id);
            }
        }
    }

    /// Send one frame to every client in a room. Clients whose buffers are
    /// full are dropped from the roster afterwards.
    pub async fn broadcast_room(&self, room_id: &str, msg: &ServerMessage) {
        let stuck: Vec<String> = {
            let roster = self.roster.read().await;
            let Some(clients) = roster.get(room_id) else { return };
            clients
                .iter()
                .filter_map(|(id, tx)| match tx.try_send(msg.clone()) {
                    Ok(()) => None,
                    Err(mpsc::error::TrySendError::Full(_))
                    | Err(mpsc::error::TrySendError::Closed(_)) => Some(id.clone()),
                })
                .collect()
        };
        for client_id in stuck {
            tracing::debug!(room_id, client_id, "dropping unresponsive client from roster");
            self.leave(room_id, &client_id).await;
        }
    }

    /// Send one frame to a specific client in a room, if still attached.
    pub async fn send_to(&self, room_id: &str, client_id: &str, msg: ServerMessage) -> bool {
        let roster = self.roster.read().await;
        roster
            .get(room_id)
            .and_then(|clients| clients.get(client_id))
            .is_some_and(|tx| tx.try_send(msg).is_ok())
    }

    /// The broadcaster client currently owning a room, if any.
    pub fn broadcaster_of(&self, room_id: &str) -> Option<String> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.active_broadcasts.get(room_id).cloned())
    }

    /// Media state consulted on join.
    pub fn room_state(&self, room_id: &str) -> RoomMediaState {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.room_states.get(room_id).cloned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
pub(crate) mod tests;
