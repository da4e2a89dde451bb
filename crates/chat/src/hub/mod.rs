// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat hub: the WebSocket front-end, the local delivery roster, and the
//! gRPC delivery surface.

pub mod roster;
pub mod rpc;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use skein_core::clients::AuthClient;
use skein_core::ids::IdAllocator;
use skein_core::registry::HubRegistry;

use crate::config::HubConfig;
use crate::log::ChatLogProducer;

use roster::Roster;

pub struct ChatHub {
    pub config: HubConfig,
    pub auth: AuthClient,
    pub registry: HubRegistry,
    pub ids: IdAllocator,
    pub producer: ChatLogProducer,
    pub roster: Arc<Roster>,
    pub shutdown: CancellationToken,
}

impl ChatHub {
    pub fn new(
        config: HubConfig,
        registry: HubRegistry,
        ids: IdAllocator,
        producer: ChatLogProducer,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let auth = AuthClient::new(&config.auth_url);
        let roster = Roster::spawn(shutdown.clone());
        Arc::new(Self { config, auth, registry, ids, producer, roster, shutdown })
    }

    /// Join a client to `(room, session)` and assert ownership in the
    /// registry. Registration is an idempotent re-assertion, so asserting on
    /// every join (not only the first) also refreshes the TTL early.
    pub async fn join(&self, client_id: &str, room_id: &str, session_id: &str) {
        self.roster.join(client_id, room_id, session_id).await;
        if let Err(e) = self.registry.register(room_id, session_id).await {
            warn!(room_id, session_id, err = %e, "registration failed");
        }
    }

    /// Remove a client from `(room, session)`; the last member out drops the
    /// registration.
    pub async fn leave(&self, client_id: &str, room_id: &str, session_id: &str) {
        if self.roster.leave(client_id, room_id, session_id).await {
            if let Err(e) = self.registry.deregister(room_id, session_id).await {
                warn!(room_id, session_id, err = %e, "deregistration failed");
            }
        }
    }

    /// Disconnect path: leave any membership, then drop the client handle.
    pub async fn detach(&self, client_id: &str, membership: Option<(String, String)>) {
        if let Some((room_id, session_id)) = membership {
            self.leave(client_id, &room_id, &session_id).await;
        }
        self.roster.remove_client(client_id).await;
    }
}
