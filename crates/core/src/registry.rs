// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room↔instance registry.
//!
//! Maps `(roomID, sessionID)` to the advertise address of the chat-hub
//! instance currently owning WebSocket clients for that pair. Entries are
//! plain Redis strings with a TTL; a heartbeat task re-asserts every key this
//! instance manages, so a crashed instance simply ages out and lookups report
//! [`LookupError::NotRegistered`]. Registration is last-writer-wins — hub
//! affinity is pinned by the upstream load balancer during the WebSocket
//! upgrade, so a competing writer is always the new owner.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lookup failure modes.
#[derive(Debug)]
pub enum LookupError {
    /// No live registration for the pair.
    NotRegistered,
    /// The store could not be reached.
    Unavailable(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered => f.write_str("not registered"),
            Self::Unavailable(detail) => write!(f, "registry unavailable: {detail}"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Registry key for one `(room, session)` pair.
pub fn registry_key(prefix: &str, room_id: &str, session_id: &str) -> String {
    format!("{prefix}:room:{room_id}:session:{session_id}")
}

/// Clamp the heartbeat interval below half the TTL so a healthy instance can
/// never lose a key between refreshes.
pub fn effective_heartbeat(ttl: Duration, interval: Duration) -> Duration {
    let ceiling = ttl / 2;
    if interval >= ceiling {
        ceiling.saturating_sub(Duration::from_millis(100)).max(Duration::from_millis(100))
    } else {
        interval
    }
}

#[derive(Clone)]
pub struct HubRegistry {
    conn: ConnectionManager,
    prefix: String,
    advertise_addr: String,
    ttl: Duration,
    heartbeat_interval: Duration,
    managed: Arc<RwLock<HashSet<(String, String)>>>,
    heartbeat_cancel: CancellationToken,
}

impl HubRegistry {
    pub async fn connect(
        redis_url: &str,
        prefix: &str,
        advertise_addr: &str,
        ttl: Duration,
        heartbeat_interval: Duration,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;

        let effective = effective_heartbeat(ttl, heartbeat_interval);
        if effective != heartbeat_interval {
            warn!(
                configured_ms = heartbeat_interval.as_millis() as u64,
                effective_ms = effective.as_millis() as u64,
                "registry heartbeat interval clamped below ttl/2"
            );
        }

        info!(prefix, advertise_addr, ttl_secs = ttl.as_secs(), "registry connected");
        Ok(Self {
            conn,
            prefix: prefix.to_owned(),
            advertise_addr: advertise_addr.to_owned(),
            ttl,
            heartbeat_interval: effective,
            managed: Arc::new(RwLock::new(HashSet::new())),
            heartbeat_cancel: CancellationToken::new(),
        })
    }

    /// Assert ownership of `(room, session)` and return the advertise address
    /// written. Idempotent: re-registering refreshes the TTL.
    pub async fn register(&self, room_id: &str, session_id: &str) -> anyhow::Result<String> {
        let key = registry_key(&self.prefix, room_id, session_id);
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, &self.advertise_addr, self.ttl.as_secs()).await?;
        self.managed.write().await.insert((room_id.to_owned(), session_id.to_owned()));
        debug!(room_id, session_id, addr = %self.advertise_addr, "registered");
        Ok(self.advertise_addr.clone())
    }

    /// Drop the registration for `(room, session)`.
    pub async fn deregister(&self, room_id: &str, session_id: &str) -> anyhow::Result<()> {
        let key = registry_key(&self.prefix, room_id, session_id);
        self.managed.write().await.remove(&(room_id.to_owned(), session_id.to_owned()));
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key).await?;
        debug!(room_id, session_id, "deregistered");
        Ok(())
    }

    /// Resolve the advertise address owning `(room, session)`.
    pub async fn lookup(&self, room_id: &str, session_id: &str) -> Result<String, LookupError> {
        let key = registry_key(&self.prefix, room_id, session_id);
        let mut conn = self.conn.clone();
        let addr: Option<String> =
            conn.get(&key).await.map_err(|e| LookupError::Unavailable(e.to_string()))?;
        addr.ok_or(LookupError::NotRegistered)
    }

    /// Spawn the heartbeat task: re-asserts every managed key with the TTL on
    /// an interval strictly below TTL/2. Runs until [`Self::stop_heartbeat`]
    /// or `shutdown` fires.
    pub fn start_heartbeat(&self, shutdown: CancellationToken) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(registry.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = registry.heartbeat_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let keys: Vec<(String, String)> =
                    registry.managed.read().await.iter().cloned().collect();
                for (room_id, session_id) in keys {
                    let key = registry_key(&registry.prefix, &room_id, &session_id);
                    let mut conn = registry.conn.clone();
                    if let Err(e) = conn
                        .set_ex::<_, _, ()>(&key, &registry.advertise_addr, registry.ttl.as_secs())
                        .await
                    {
                        warn!(room_id, session_id, err = %e, "heartbeat refresh failed");
                    }
                }
            }
            debug!("registry heartbeat stopped");
        });
    }

    pub fn stop_heartbeat(&self) {
        self.heartbeat_cancel.cancel();
    }

    /// Stop the heartbeat and drop every registration this instance owns.
    pub async fn close(&self) {
        self.stop_heartbeat();
        let keys: Vec<(String, String)> = self.managed.write().await.drain().collect();
        for (room_id, session_id) in keys {
            let key = registry_key(&self.prefix, &room_id, &session_id);
            let mut conn = self.conn.clone();
            if let Err(e) = conn.del::<_, ()>(&key).await {
                warn!(room_id, session_id, err = %e, "deregister on close failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
