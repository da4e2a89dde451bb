// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared presence service state: the local client roster per room.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use skein_core::bus::EventBus;
use skein_core::clients::AuthClient;

use crate::config::PresenceConfig;
use crate::store::PresenceStore;
use crate::ws_msg::ServerMessage;

/// Per-client outbound buffer.
pub const CLIENT_BUFFER: usize = 32;

pub struct PresenceState {
    pub config: PresenceConfig,
    pub bus: EventBus,
    pub store: PresenceStore,
    pub auth: AuthClient,
    /// roomID → clientID → outbound sender.
    pub roster: RwLock<HashMap<String, HashMap<String, mpsc::Sender<ServerMessage>>>>,
    pub shutdown: CancellationToken,
}

impl PresenceState {
    pub fn new(
        config: PresenceConfig,
        bus: EventBus,
        store: PresenceStore,
        shutdown: CancellationToken,
    ) -> Self {
        let auth = AuthClient::new(&config.auth_url);
        Self { config, bus, store, auth, roster: RwLock::new(HashMap::new()), shutdown }
    }

    pub async fn join(&self, room_id: &str, client_id: &str, tx: mpsc::Sender<ServerMessage>) {
        let mut roster = self.roster.write().await;
        roster.entry(room_id.to_owned()).or_default().insert(client_id.to_owned(), tx);
    }

    pub async fn leave(&self, room_id: &str, client_id: &str) {
        let mut roster = self.roster.write().await;
        if let Some(clients) = roster.get_mut(room_id) {
            clients.remove(client_id);
            if clients.is_empty() {
                roster.remove(room_id);
            }
        }
    }

    /// Rooms with at least one local client.
    pub async fn local_rooms(&self) -> Vec<String> {
        self.roster.read().await.keys().cloned().collect()
    }

    /// Push one frame to every local client of a room; full buffers drop the
    /// client from the roster.
    pub async fn broadcast_room(&self, room_id: &str, msg: &ServerMessage) {
        let stuck: Vec<String> = {
            let roster = self.roster.read().await;
            let Some(clients) = roster.get(room_id) else { return };
            clients
                .iter()
                .filter_map(|(id, tx)| tx.try_send(msg.clone()).is_err().then(|| id.clone()))
                .collect()
        };
        for client_id in stuck {
            tracing::debug!(room_id, client_id, "dropping unresponsive presence client");
            self.leave(room_id, &client_id).await;
        }
    }
}
