// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence store: room membership sets, TTL'd reverse mappings, and the
//! authoritative live-status records.
//!
//! Two variants behind one enum: Redis (shared across instances — the
//! aggregate count's source of truth) and in-memory (single instance, tests).
//! A room's count is `|auth users| + |anon devices|`; the Redis reads pair
//! both SCARDs in one pipelined round trip.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Who is present: an authenticated user or an anonymous device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Auth { user_id: String },
    Anon { device_hash: String },
}

impl Identity {
    /// Member value within the room set.
    pub fn member(&self) -> &str {
        match self {
            Self::Auth { user_id } => user_id,
            Self::Anon { device_hash } => device_hash,
        }
    }

    /// The room set this identity belongs in.
    pub fn room_set(&self, room_id: &str) -> String {
        match self {
            Self::Auth { .. } => format!("presence:room:{room_id}:users"),
            Self::Anon { .. } => format!("presence:room:{room_id}:devices"),
        }
    }

    /// The TTL'd reverse mapping key.
    pub fn reverse_key(&self) -> String {
        match self {
            Self::Auth { user_id } => format!("presence:user:{user_id}"),
            Self::Anon { device_hash } => format!("presence:device:{device_hash}"),
        }
    }
}

/// Authoritative live-state record for a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveStatus {
    pub is_live: bool,
    pub broadcaster_id: String,
    /// Unix millis.
    pub started_at: i64,
}

fn live_rooms_key() -> &'static str {
    "presence:live_rooms"
}

fn live_status_key(room_id: &str) -> String {
    format!("presence:room:{room_id}:live_status")
}

#[derive(Clone)]
pub enum PresenceStore {
    Redis(RedisPresence),
    Memory(MemoryPresence),
}

impl PresenceStore {
    pub async fn connect_redis(
        redis_url: &str,
        heartbeat_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::Redis(RedisPresence { conn, ttl_secs: heartbeat_timeout.as_secs() }))
    }

    pub fn memory() -> Self {
        Self::Memory(MemoryPresence::default())
    }

    /// Record presence; returns the room's count afterwards.
    pub async fn join(&self, room_id: &str, identity: &Identity) -> anyhow::Result<u64> {
        match self {
            Self::Redis(s) => s.join(room_id, identity).await,
            Self::Memory(s) => Ok(s.join(room_id, identity).await),
        }
    }

    /// Refresh the identity's TTL.
    pub async fn heartbeat(&self, identity: &Identity) -> anyhow::Result<()> {
        match self {
            Self::Redis(s) => s.heartbeat(identity).await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// Remove presence; returns the room's count afterwards.
    pub async fn leave(&self, room_id: &str, identity: &Identity) -> anyhow::Result<u64> {
        match self {
            Self::Redis(s) => s.leave(room_id, identity).await,
            Self::Memory(s) => Ok(s.leave(room_id, identity).await),
        }
    }

    /// `|auth entries| + |anon entries|`.
    pub async fn count(&self, room_id: &str) -> anyhow::Result<u64> {
        match self {
            Self::Redis(s) => s.count(room_id).await,
            Self::Memory(s) => Ok(s.count(room_id).await),
        }
    }

    pub async fn set_live(&self, room_id: &str, status: &LiveStatus) -> anyhow::Result<()> {
        match self {
            Self::Redis(s) => s.set_live(room_id, status).await,
            Self::Memory(s) => {
                s.set_live(room_id, status).await;
                Ok(())
            }
        }
    }

    pub async fn set_offline(&self, room_id: &str) -> anyhow::Result<()> {
        match self {
            Self::Redis(s) => s.set_offline(room_id).await,
            Self::Memory(s) => {
                s.set_offline(room_id).await;
                Ok(())
            }
        }
    }

    pub async fn live_rooms(&self) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Redis(s) => s.live_rooms().await,
            Self::Memory(s) => Ok(s.live_rooms().await),
        }
    }

    pub async fn live_status(&self, room_id: &str) -> anyhow::Result<Option<LiveStatus>> {
        match self {
            Self::Redis(s) => s.live_status(room_id).await,
            Self::Memory(s) => Ok(s.live_status(room_id).await),
        }
    }
}

// ── Redis backend ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisPresence {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisPresence {
    async fn join(&self, room_id: &str, identity: &Identity) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .sadd(identity.room_set(room_id), identity.member())
            .ignore()
            .set_ex(identity.reverse_key(), room_id, self.ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        self.count(room_id).await
    }

    async fn heartbeat(&self, identity: &Identity) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, bool>(identity.reverse_key(), self.ttl_secs as i64).await?;
        Ok(())
    }

    async fn leave(&self, room_id: &str, identity: &Identity) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(identity.room_set(room_id), identity.member())
            .ignore()
            .del(identity.reverse_key())
            .ignore()
            .query_async(&mut conn)
            .await?;
        self.count(room_id).await
    }

    async fn count(&self, room_id: &str) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let (users, devices): (u64, u64) = redis::pipe()
            .atomic()
            .scard(format!("presence:room:{room_id}:users"))
            .scard(format!("presence:room:{room_id}:devices"))
            .query_async(&mut conn)
            .await?;
        Ok(users + devices)
    }

    async fn set_live(&self, room_id: &str, status: &LiveStatus) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                live_status_key(room_id),
                &[
                    ("is_live", "true".to_owned()),
                    ("broadcaster_id", status.broadcaster_id.clone()),
                    ("started_at", status.started_at.to_string()),
                ],
            )
            .ignore()
            .sadd(live_rooms_key(), room_id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_offline(&self, room_id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(live_rooms_key(), room_id)
            .ignore()
            .del(live_status_key(room_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn live_rooms(&self) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(live_rooms_key()).await?)
    }

    async fn live_status(&self, room_id: &str) -> anyhow::Result<Option<LiveStatus>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(live_status_key(room_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(LiveStatus {
            is_live: fields.get("is_live").is_some_and(|v| v == "true"),
            broadcaster_id: fields.get("broadcaster_id").cloned().unwrap_or_default(),
            started_at: fields.get("started_at").and_then(|v| v.parse().ok()).unwrap_or(0),
        }))
    }
}

// ── In-memory backend ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryPresence {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, HashSet<String>>,
    devices: HashMap<String, HashSet<String>>,
    live: HashMap<String, LiveStatus>,
}

impl MemoryPresence {
    async fn join(&self, room_id: &str, identity: &Identity) -> u64 {
        let mut inner = self.inner.lock().await;
        let set = match identity {
            Identity::Auth { .. } => inner.users.entry(room_id.to_owned()).or_default(),
            Identity::Anon { .. } => inner.devices.entry(room_id.to_owned()).or_default(),
        };
        set.insert(identity.member().to_owned());
        Self::count_inner(&inner, room_id)
    }

    async fn leave(&self, room_id: &str, identity: &Identity) -> u64 {
        let mut inner = self.inner.lock().await;
        let set = match identity {
            Identity::Auth { .. } => inner.users.get_mut(room_id),
            Identity::Anon { .. } => inner.devices.get_mut(room_id),
        };
        if let Some(set) = set {
            set.remove(identity.member());
        }
        Self::count_inner(&inner, room_id)
    }

    async fn count(&self, room_id: &str) -> u64 {
        Self::count_inner(&*self.inner.lock().await, room_id)
    }

    fn count_inner(inner: &MemoryInner, room_id: &str) -> u64 {
        let users = inner.users.get(room_id).map_or(0, HashSet::len);
        let devices = inner.devices.get(room_id).map_or(0, HashSet::len);
        (users + devices) as u64
    }

    async fn set_live(&self, room_id: &str, status: &LiveStatus) {
        self.inner.lock().await.live.insert(room_id.to_owned(), status.clone());
    }

    async fn set_offline(&self, room_id: &str) {
        self.inner.lock().await.live.remove(room_id);
    }

    async fn live_rooms(&self) -> Vec<String> {
        self.inner.lock().await.live.keys().cloned().collect()
    }

    async fn live_status(&self, room_id: &str) -> Option<LiveStatus> {
        self.inner.lock().await.live.get(room_id).cloned()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
