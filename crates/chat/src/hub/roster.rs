// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hub's local delivery roster and broadcast queue.
//!
//! `clients` and `room_sessions` sit under one RwLock; broadcasts take the
//! read side and iterate a snapshot of senders, registrations take the write
//! side briefly. A client whose send buffer is full is unregistered rather
//! than allowed to block the broadcaster.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-client outbound frame buffer.
pub const CLIENT_BUFFER: usize = 64;

/// Broadcast queue depth.
const BROADCAST_QUEUE: usize = 1024;

/// One queued fan-out.
#[derive(Debug)]
pub struct Broadcast {
    pub room_id: String,
    pub session_id: String,
    /// Pre-serialized frame shared by every recipient.
    pub bytes: String,
    pub exclude: Option<String>,
}

struct ClientHandle {
    tx: mpsc::Sender<String>,
}

#[derive(Default)]
struct Tables {
    clients: HashMap<String, ClientHandle>,
    room_sessions: HashMap<(String, String), HashSet<String>>,
}

pub struct Roster {
    tables: RwLock<Tables>,
    broadcast_tx: mpsc::Sender<Broadcast>,
}

impl Roster {
    /// Create the roster and start its broadcast pump.
    pub fn spawn(shutdown: CancellationToken) -> Arc<Self> {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE);
        let roster = Arc::new(Self { tables: RwLock::new(Tables::default()), broadcast_tx });
        Arc::clone(&roster).spawn_broadcaster(broadcast_rx, shutdown);
        roster
    }

    /// Attach a client's outbound channel.
    pub async fn attach(&self, client_id: &str, tx: mpsc::Sender<String>) {
        let mut tables = self.tables.write().await;
        tables.clients.insert(client_id.to_owned(), ClientHandle { tx });
    }

    /// Add a client to `(room, session)`. Returns true when the pair gained
    /// its first member.
    pub async fn join(&self, client_id: &str, room_id: &str, session_id: &str) -> bool {
        let mut tables = self.tables.write().await;
        let members = tables
            .room_sessions
            .entry((room_id.to_owned(), session_id.to_owned()))
            .or_default();
        let first = members.is_empty();
        members.insert(client_id.to_owned());
        first
    }

    /// Remove a client from `(room, session)`. Returns true when the pair
    /// lost its last member.
    pub async fn leave(&self, client_id: &str, room_id: &str, session_id: &str) -> bool {
        let mut tables = self.tables.write().await;
        let key = (room_id.to_owned(), session_id.to_owned());
        match tables.room_sessions.get_mut(&key) {
            Some(members) => {
                members.remove(client_id);
                if members.is_empty() {
                    tables.room_sessions.remove(&key);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Drop a client's outbound channel.
    pub async fn remove_client(&self, client_id: &str) {
        self.tables.write().await.clients.remove(client_id);
    }

    /// Queue a fan-out and report how many clients it addresses.
    pub async fn deliver(
        &self,
        room_id: &str,
        session_id: &str,
        bytes: String,
        exclude: Option<String>,
    ) -> usize {
        let count = {
            let tables = self.tables.read().await;
            let key = (room_id.to_owned(), session_id.to_owned());
            tables
                .room_sessions
                .get(&key)
                .map(|members| {
                    members.iter().filter(|id| Some(id.as_str()) != exclude.as_deref()).count()
                })
                .unwrap_or(0)
        };
        if count == 0 {
            return 0;
        }
        let broadcast = Broadcast {
            room_id: room_id.to_owned(),
            session_id: session_id.to_owned(),
            bytes,
            exclude,
        };
        if self.broadcast_tx.send(broadcast).await.is_err() {
            return 0;
        }
        count
    }

    /// Clients attached to `(room, session)` right now.
    pub async fn member_count(&self, room_id: &str, session_id: &str) -> usize {
        let tables = self.tables.read().await;
        tables
            .room_sessions
            .get(&(room_id.to_owned(), session_id.to_owned()))
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Pump the broadcast queue: snapshot the roster under the read lock,
    /// push frames, and unregister clients whose buffers are full.
    fn spawn_broadcaster(
        self: Arc<Self>,
        mut broadcast_rx: mpsc::Receiver<Broadcast>,
        shutdown: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                let broadcast = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    b = broadcast_rx.recv() => {
                        let Some(b) = b else { break };
                        b
                    }
                };

                let stuck: Vec<String> = {
                    let tables = self.tables.read().await;
                    let key = (broadcast.room_id.clone(), broadcast.session_id.clone());
                    let Some(members) = tables.room_sessions.get(&key) else { continue };
                    members
                        .iter()
                        .filter(|id| Some(id.as_str()) != broadcast.exclude.as_deref())
                        .filter_map(|id| {
                            let handle = tables.clients.get(id)?;
                            match handle.tx.try_send(broadcast.bytes.clone()) {
                                Ok(()) => None,
                                Err(_) => Some(id.clone()),
                            }
                        })
                        .collect()
                };

                for client_id in stuck {
                    debug!(
                        client_id,
                        room_id = %broadcast.room_id,
                        "send buffer full, unregistering client"
                    );
                    self.leave(&client_id, &broadcast.room_id, &broadcast.session_id).await;
                    self.remove_client(&client_id).await;
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "roster_tests.rs"]
mod tests;
