// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-ID allocation.
//!
//! IDs are allocated centrally so that `(room_id, session_id, message_id)` is
//! unique no matter which hub instance produced the message, and so that ID
//! order equals produced order within a session. One Redis counter per
//! `(room, session)` gives monotonic, k-sortable integers.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Counter key for one `(room, session)` pair.
pub fn counter_key(prefix: &str, room_id: &str, session_id: &str) -> String {
    format!("{prefix}:mid:{room_id}:{session_id}")
}

#[derive(Clone)]
pub struct IdAllocator {
    conn: ConnectionManager,
    prefix: String,
}

impl IdAllocator {
    pub async fn connect(redis_url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, prefix: prefix.to_owned() })
    }

    /// Allocate the next ID for `(room, session)`.
    pub async fn next(&self, room_id: &str, session_id: &str) -> anyhow::Result<i64> {
        let key = counter_key(&self.prefix, room_id, session_id);
        let mut conn = self.conn.clone();
        let id: i64 = conn.incr(&key, 1).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::counter_key;

    #[test]
    fn counter_key_format() {
        assert_eq!(counter_key("chat", "r1", "s1"), "chat:mid:r1:s1");
    }
}
