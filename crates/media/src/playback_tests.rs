// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::config::HlsConfig;
use crate::storage::{LocalStorage, Storage};

use super::{router, safe_component, PlaybackState};

fn state(root: &std::path::Path) -> Arc<PlaybackState> {
    Arc::new(PlaybackState {
        hls: HlsConfig {
            hls_output_dir: root.to_path_buf(),
            hls_segment_duration_secs: 4,
            hls_playlist_size: 6,
            hls_delete_segments: false,
        },
        storage: Storage::Local(LocalStorage::new(root.join("store"), "http://cdn.test")),
    })
}

#[test]
fn path_components_are_validated() {
    assert!(safe_component("r1"));
    assert!(safe_component("2024-01-01T00-00-00Z"));
    assert!(!safe_component(""));
    assert!(!safe_component("../etc"));
    assert!(!safe_component("a/b"));
    assert!(!safe_component("a b"));
}

#[tokio::test]
async fn live_playlist_served_with_hls_headers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let session_dir = dir.path().join("room_r1/2024-01-01T00-00-00Z");
    tokio::fs::create_dir_all(&session_dir).await?;
    tokio::fs::write(session_dir.join("stream.m3u8"), "#EXTM3U\n").await?;

    let server = axum_test::TestServer::new(router(state(dir.path())))?;
    let resp = server.get("/live/r1/2024-01-01T00-00-00Z/stream.m3u8").await;
    resp.assert_status_ok();
    assert_eq!(
        resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/vnd.apple.mpegurl")
    );
    assert_eq!(
        resp.headers().get("cache-control").and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );
    resp.assert_text("#EXTM3U\n");
    Ok(())
}

#[tokio::test]
async fn live_segment_served_with_short_cache() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let session_dir = dir.path().join("room_r1/s1");
    tokio::fs::create_dir_all(&session_dir).await?;
    tokio::fs::write(session_dir.join("segment_000.ts"), b"tsdata").await?;

    let server = axum_test::TestServer::new(router(state(dir.path())))?;
    let resp = server.get("/live/r1/s1/segment_000.ts").await;
    resp.assert_status_ok();
    assert_eq!(
        resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("video/mp2t")
    );
    assert_eq!(
        resp.headers().get("cache-control").and_then(|v| v.to_str().ok()),
        Some("max-age=10")
    );
    Ok(())
}

#[tokio::test]
async fn non_segment_names_are_not_served() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let session_dir = dir.path().join("room_r1/s1");
    tokio::fs::create_dir_all(&session_dir).await?;
    tokio::fs::write(session_dir.join("video.pipe"), b"x").await?;

    let server = axum_test::TestServer::new(router(state(dir.path())))?;
    let resp = server.get("/live/r1/s1/video.pipe").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn vod_playlist_redirects_into_storage() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = axum_test::TestServer::new(router(state(dir.path())))?;
    let resp = server.get("/vod/r1/s1/stream.m3u8").await;
    resp.assert_status(axum::http::StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        resp.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("http://cdn.test/vod/room_r1/s1/stream.m3u8")
    );
    Ok(())
}

#[tokio::test]
async fn health_endpoints_respond() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = axum_test::TestServer::new(router(state(dir.path())))?;
    server.get("/health").await.assert_text("OK");
    server.get("/healthz").await.assert_text("OK");
    Ok(())
}
