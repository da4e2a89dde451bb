// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence consumer: the chat log's durable archive.
//!
//! Reads the same topic as the dispatcher under its own group id and writes
//! each message into Postgres keyed `(room_id, session_id, message_id)` with
//! ascending clustering by `message_id`. Re-delivered records are no-ops, so
//! the log's at-least-once semantics stay invisible downstream.

use rdkafka::Message;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skein_core::message::ChatMessage;

use crate::config::PersistConfig;
use crate::log;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chat_messages (
    room_id    TEXT NOT NULL,
    session_id TEXT NOT NULL,
    message_id BIGINT NOT NULL,
    user_id    TEXT NOT NULL,
    username   TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (room_id, session_id, message_id)
)";

/// Connect the archive pool and ensure the table exists.
pub async fn connect(config: &PersistConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// Run the persistence consumer until shutdown.
pub async fn run(
    config: PersistConfig,
    pool: PgPool,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let consumer = log::consumer(&config.kafka, log::GROUP_PERSIST)?;
    info!("persistence consumer reading chat log");

    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = consumer.recv() => match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(err = %e, "chat log consume error");
                    continue;
                }
            },
        };

        let Some(payload) = msg.payload() else { continue };
        let message: ChatMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                debug!(err = %e, "dropping undecodable chat record");
                continue;
            }
        };

        if let Err(e) = insert(&pool, &message).await {
            warn!(
                room_id = %message.room_id,
                message_id = message.message_id,
                err = %e,
                "archive write failed"
            );
        }
    }

    Ok(())
}

/// Idempotent insert: a re-delivered `message_id` is a no-op.
async fn insert(pool: &PgPool, message: &ChatMessage) -> anyhow::Result<()> {
    let created_at = chrono::DateTime::from_timestamp_millis(message.timestamp)
        .unwrap_or_else(chrono::Utc::now);
    sqlx::query(
        "INSERT INTO chat_messages
            (room_id, session_id, message_id, user_id, username, content, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (room_id, session_id, message_id) DO NOTHING",
    )
    .bind(&message.room_id)
    .bind(&message.session_id)
    .bind(message.message_id)
    .bind(&message.user_id)
    .bind(&message.username)
    .bind(&message.content)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}
