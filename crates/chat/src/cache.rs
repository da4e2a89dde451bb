// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache-aside layer for history reads, with request coalescing.
//!
//! Concurrent identical misses share one store query: the first requester
//! registers an in-flight slot and the rest wait on it, so a hot page costs
//! the store a single read per cache window. Cache writes are fire-and-forget
//! with a short timeout — the archive remains the source of truth.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Bound on the detached cache-set write.
const SET_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache key for one history page.
pub fn page_key(
    prefix: &str,
    room_id: &str,
    session_id: &str,
    cursor: Option<i64>,
    direction: &str,
    limit: u32,
) -> String {
    let cursor = cursor.map_or_else(|| "start".to_owned(), |c| c.to_string());
    format!("{prefix}:{room_id}:{session_id}:{cursor}:{direction}:{limit}")
}

type InflightMap = Mutex<HashMap<String, watch::Receiver<Option<String>>>>;

#[derive(Clone)]
pub struct HistoryCache {
    conn: Option<ConnectionManager>,
    prefix: String,
    ttl_secs: u64,
    inflight: Arc<InflightMap>,
}

impl HistoryCache {
    pub async fn connect(redis_url: &str, prefix: &str, ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn: Some(conn),
            prefix: prefix.to_owned(),
            ttl_secs: ttl.as_secs(),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// A cache that only coalesces (no external store). Used in tests.
    pub fn disconnected(prefix: &str) -> Self {
        Self {
            conn: None,
            prefix: prefix.to_owned(),
            ttl_secs: 0,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Serve from cache, or run `fetch` exactly once per burst of identical
    /// concurrent requests.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> anyhow::Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        // Either become the requester running the fetch or join one in flight.
        let leader = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(key) {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.to_owned(), rx);
                    Ok(tx)
                }
            }
        };

        match leader {
            Ok(tx) => {
                let result = fetch().await;
                self.inflight.lock().await.remove(key);
                match result {
                    Ok(value) => {
                        let _ = tx.send(Some(value.clone()));
                        self.set_detached(key, value.clone());
                        Ok(value)
                    }
                    // Dropping the sender wakes waiters with an error.
                    Err(e) => Err(e),
                }
            }
            Err(mut rx) => {
                let value = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| anyhow::anyhow!("coalesced read failed"))?
                    .clone();
                value.ok_or_else(|| anyhow::anyhow!("coalesced read failed"))
            }
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let conn = self.conn.as_ref()?;
        let mut conn = conn.clone();
        conn.get::<_, Option<String>>(key).await.ok().flatten()
    }

    /// Fire-and-forget cache write.
    fn set_detached(&self, key: &str, value: String) {
        let Some(conn) = self.conn.as_ref() else { return };
        let mut conn = conn.clone();
        let key = key.to_owned();
        let ttl = self.ttl_secs;
        tokio::spawn(async move {
            let write = conn.set_ex::<_, _, ()>(&key, value, ttl);
            match tokio::time::timeout(SET_TIMEOUT, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(key, err = %e, "cache set failed"),
                Err(_) => debug!(key, "cache set timed out"),
            }
        });
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
