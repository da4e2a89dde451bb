// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History reader: cursor-paginated reads over the message archive.
//!
//! The reader never writes. Pages are fetched with `LIMIT limit+1` so
//! `has_more` comes from the row count, cached for a short TTL, and identical
//! concurrent misses coalesce into one archive query.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::warn;

use skein_core::error::{ErrorCode, ErrorResponse};
use skein_core::message::ChatMessage;

use crate::cache::{page_key, HistoryCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Backward (newest first) is the default.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("backward") => Some(Self::Backward),
            Some("forward") => Some(Self::Forward),
            Some(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Clamp a requested page size into `[1, max]`.
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Trim a `limit+1` row fetch into the page plus pagination markers.
pub fn page_window(mut rows: Vec<ChatMessage>, limit: u32) -> (Vec<ChatMessage>, bool, Option<i64>) {
    let has_more = rows.len() > limit as usize;
    rows.truncate(limit as usize);
    let next_cursor = rows.last().map(|m| m.message_id);
    (rows, has_more, next_cursor)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<i64>,
    pub limit: Option<u32>,
    pub direction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
    pub has_more: bool,
}

pub struct HistoryState {
    pub pool: PgPool,
    pub cache: HistoryCache,
    pub default_limit: u32,
    pub max_limit: u32,
}

pub fn router(state: Arc<HistoryState>) -> Router {
    Router::new()
        .route(
            "/api/v1/rooms/{room_id}/sessions/{session_id}/messages",
            get(get_messages),
        )
        .route("/health", get(|| async { "OK" }))
        .route("/healthz", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn get_messages(
    State(state): State<Arc<HistoryState>>,
    Path((room_id, session_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(direction) = Direction::parse(query.direction.as_deref()) else {
        return error_response(ErrorCode::BadRequest, "direction must be forward or backward");
    };
    let limit = clamp_limit(query.limit, state.default_limit, state.max_limit);

    let key = page_key(
        state.cache.prefix(),
        &room_id,
        &session_id,
        query.cursor,
        direction.as_str(),
        limit,
    );

    let pool = state.pool.clone();
    let fetch_room = room_id.clone();
    let fetch_session = session_id.clone();
    let cursor = query.cursor;
    let result = state
        .cache
        .get_or_fetch(&key, || async move {
            let rows = fetch_page(&pool, &fetch_room, &fetch_session, cursor, direction, limit)
                .await?;
            let (messages, has_more, next_cursor) = page_window(rows, limit);
            let page = HistoryPage { messages, next_cursor, has_more };
            Ok(serde_json::to_string(&page)?)
        })
        .await;

    match result {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            warn!(room_id, session_id, err = %e, "history read failed");
            error_response(ErrorCode::Internal, "history unavailable")
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    room_id: String,
    session_id: String,
    message_id: i64,
    user_id: String,
    username: String,
    content: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        let mut msg = ChatMessage::new(
            row.message_id,
            &row.user_id,
            &row.username,
            &row.room_id,
            &row.session_id,
            &row.content,
        );
        msg.timestamp = row.created_at.timestamp_millis();
        msg
    }
}

/// One `LIMIT limit+1` read in the requested direction.
async fn fetch_page(
    pool: &PgPool,
    room_id: &str,
    session_id: &str,
    cursor: Option<i64>,
    direction: Direction,
    limit: u32,
) -> anyhow::Result<Vec<ChatMessage>> {
    let fetch = i64::from(limit) + 1;
    let rows: Vec<MessageRow> = match (direction, cursor) {
        (Direction::Backward, None) => {
            sqlx::query_as(
                "SELECT * FROM chat_messages
                 WHERE room_id = $1 AND session_id = $2
                 ORDER BY message_id DESC LIMIT $3",
            )
            .bind(room_id)
            .bind(session_id)
            .bind(fetch)
            .fetch_all(pool)
            .await?
        }
        (Direction::Backward, Some(cursor)) => {
            sqlx::query_as(
                "SELECT * FROM chat_messages
                 WHERE room_id = $1 AND session_id = $2 AND message_id < $3
                 ORDER BY message_id DESC LIMIT $4",
            )
            .bind(room_id)
            .bind(session_id)
            .bind(cursor)
            .bind(fetch)
            .fetch_all(pool)
            .await?
        }
        (Direction::Forward, None) => {
            sqlx::query_as(
                "SELECT * FROM chat_messages
                 WHERE room_id = $1 AND session_id = $2
                 ORDER BY message_id ASC LIMIT $3",
            )
            .bind(room_id)
            .bind(session_id)
            .bind(fetch)
            .fetch_all(pool)
            .await?
        }
        (Direction::Forward, Some(cursor)) => {
            sqlx::query_as(
                "SELECT * FROM chat_messages
                 WHERE room_id = $1 AND session_id = $2 AND message_id > $3
                 ORDER BY message_id ASC LIMIT $4",
            )
            .bind(room_id)
            .bind(session_id)
            .bind(cursor)
            .bind(fetch)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.into_iter().map(ChatMessage::from).collect())
}

fn error_response(code: ErrorCode, message: &str) -> Response {
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse { error: code.to_error_body(message) };
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
