// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VOD session records.
//!
//! Two store variants behind one enum: in-memory (single worker) and Redis
//! (shared across workers, survives restarts). At most one non-COMPLETED
//! session exists per room; transitions are monotonic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::SessionStoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Live,
    Finalizing,
    Completed,
}

impl SessionState {
    /// Position in the STARTING → LIVE → FINALIZING → COMPLETED order.
    fn rank(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Live => 1,
            Self::Finalizing => 2,
            Self::Completed => 3,
        }
    }

    /// Transitions never move backwards.
    pub fn can_transition_to(self, next: Self) -> bool {
        next.rank() >= self.rank()
    }
}

/// Per-broadcast session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VodSession {
    pub room_id: String,
    /// UTC timestamp rendered as `YYYY-MM-DDTHH-MM-SSZ`.
    pub session_id: String,
    pub state: SessionState,
    pub local_dir: PathBuf,
    pub storage_prefix: String,
    /// Unix millis.
    pub start_time: i64,
}

impl VodSession {
    pub fn new(room_id: &str, session_id: &str, local_dir: PathBuf) -> Self {
        Self {
            room_id: room_id.to_owned(),
            session_id: session_id.to_owned(),
            state: SessionState::Starting,
            local_dir,
            storage_prefix: format!("vod/room_{room_id}/{session_id}"),
            start_time: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Render a session ID from a UTC instant.
pub fn session_id_at(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%SZ").to_string()
}

#[derive(Clone)]
pub enum SessionStore {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl SessionStore {
    pub async fn from_config(
        config: &SessionStoreConfig,
        redis_url: &str,
    ) -> anyhow::Result<Self> {
        match config.session_store_type.as_str() {
            "memory" => Ok(Self::Memory(MemoryStore::default())),
            "redis" => Ok(Self::Redis(RedisStore::connect(config, redis_url).await?)),
            other => anyhow::bail!("unknown session store: {other}"),
        }
    }

    /// Idempotent upsert of the room's session record.
    pub async fn save(&self, session: &VodSession) -> anyhow::Result<()> {
        match self {
            Self::Memory(s) => s.save(session).await,
            Self::Redis(s) => s.save(session).await,
        }
    }

    /// `None` means "no active session", not an error.
    pub async fn get(&self, room_id: &str) -> anyhow::Result<Option<VodSession>> {
        match self {
            Self::Memory(s) => Ok(s.get(room_id).await),
            Self::Redis(s) => s.get(room_id).await,
        }
    }

    pub async fn delete(&self, room_id: &str) -> anyhow::Result<()> {
        match self {
            Self::Memory(s) => {
                s.delete(room_id).await;
                Ok(())
            }
            Self::Redis(s) => s.delete(room_id).await,
        }
    }

    pub async fn list(&self) -> anyhow::Result<Vec<VodSession>> {
        match self {
            Self::Memory(s) => Ok(s.list().await),
            Self::Redis(s) => s.list().await,
        }
    }

    pub async fn get_by_state(&self, state: SessionState) -> anyhow::Result<Vec<VodSession>> {
        Ok(self.list().await?.into_iter().filter(|s| s.state == state).collect())
    }
}

// ── In-memory store ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<Mutex<HashMap<String, VodSession>>>,
}

impl MemoryStore {
    async fn save(&self, session: &VodSession) -> anyhow::Result<()> {
        self.sessions.lock().await.insert(session.room_id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, room_id: &str) -> Option<VodSession> {
        self.sessions.lock().await.get(room_id).cloned()
    }

    async fn delete(&self, room_id: &str) {
        self.sessions.lock().await.remove(room_id);
    }

    async fn list(&self) -> Vec<VodSession> {
        self.sessions.lock().await.values().cloned().collect()
    }
}

// ── Redis store ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

impl RedisStore {
    async fn connect(config: &SessionStoreConfig, redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            prefix: config.session_key_prefix.clone(),
            ttl_secs: config.ttl().as_secs(),
        })
    }

    fn key(&self, room_id: &str) -> String {
        format!("{}:session:{room_id}", self.prefix)
    }

    async fn save(&self, session: &VodSession) -> anyhow::Result<()> {
        let json = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        // TTL is a safety net against orphaned records, not session lifetime.
        conn.set_ex::<_, _, ()>(self.key(&session.room_id), json, self.ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, room_id: &str) -> anyhow::Result<Option<VodSession>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.key(room_id)).await?;
        Ok(match json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn delete(&self, room_id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(room_id)).await?;
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<VodSession>> {
        let pattern = format!("{}:session:*", self.prefix);
        let mut conn = self.conn.clone();
        let mut sessions = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            for key in keys {
                let json: Option<String> = conn.get(&key).await?;
                if let Some(json) = json {
                    if let Ok(session) = serde_json::from_str(&json) {
                        sessions.push(session);
                    }
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(sessions)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
