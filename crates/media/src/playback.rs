// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playback routes: live HLS from the worker's output directory and VOD
//! redirects into object storage.
//!
//! Playlists go out `application/vnd.apple.mpegurl` with `no-cache`; segments
//! `video/mp2t` with a short `max-age` — the content of a named segment never
//! changes, only the playlist does.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::config::HlsConfig;
use crate::storage::Storage;

pub struct PlaybackState {
    pub hls: HlsConfig,
    pub storage: Storage,
}

pub fn router(state: Arc<PlaybackState>) -> Router {
    Router::new()
        .route("/live/{room_id}/{session_id}/stream.m3u8", get(live_playlist))
        .route("/live/{room_id}/{session_id}/{segment}", get(live_segment))
        .route("/vod/{room_id}/{session_id}/stream.m3u8", get(vod_playlist))
        .route("/health", get(|| async { "OK" }))
        .route("/healthz", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Path components may only be plain identifiers; anything else 404s rather
/// than touching the filesystem.
fn safe_component(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !value.contains("..")
}

async fn live_playlist(
    State(state): State<Arc<PlaybackState>>,
    Path((room_id, session_id)): Path<(String, String)>,
) -> Response {
    if !safe_component(&room_id) || !safe_component(&session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.hls.session_dir(&room_id, &session_id).join("stream.m3u8");
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn live_segment(
    State(state): State<Arc<PlaybackState>>,
    Path((room_id, session_id, segment)): Path<(String, String, String)>,
) -> Response {
    if !safe_component(&room_id)
        || !safe_component(&session_id)
        || crate::vod::watcher::segment_index(&segment).is_none()
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.hls.session_dir(&room_id, &session_id).join(&segment);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "video/mp2t"),
                (header::CACHE_CONTROL, "max-age=10"),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn vod_playlist(
    State(state): State<Arc<PlaybackState>>,
    Path((room_id, session_id)): Path<(String, String)>,
) -> Response {
    if !safe_component(&room_id) || !safe_component(&session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let key = format!("vod/room_{room_id}/{session_id}/stream.m3u8");
    Redirect::temporary(&state.storage.public_url(&key)).into_response()
}

#[cfg(test)]
#[path = "playback_tests.rs"]
mod tests;
