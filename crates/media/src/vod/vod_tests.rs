// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{HlsConfig, VodConfig};
use crate::storage::{LocalStorage, Storage};

use super::store::{MemoryStore, SessionStore};
use super::{StartError, VodManager};

fn manager(root: &std::path::Path) -> VodManager {
    let hls = HlsConfig {
        hls_output_dir: root.join("hls"),
        hls_segment_duration_secs: 4,
        hls_playlist_size: 6,
        hls_delete_segments: false,
    };
    let vod = VodConfig { vod_enabled: true, vod_upload_workers: 2 };
    VodManager::new(
        hls,
        &vod,
        SessionStore::Memory(MemoryStore::default()),
        Storage::Local(LocalStorage::new(root.join("store"), "http://cdn.test")),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn start_room_creates_session_and_dir() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path());

    let session_id = manager.start_room("r1").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(session_id.ends_with('Z'));
    assert!(dir.path().join("hls").join("room_r1").join(&session_id).is_dir());
    Ok(())
}

#[tokio::test]
async fn second_start_conflicts_while_active() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path());

    manager.start_room("r1").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(matches!(manager.start_room("r1").await, Err(StartError::Conflict)));
    Ok(())
}

#[tokio::test]
async fn finalize_uploads_endlist_playlist_and_cleans_up() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path());
    let session_id = manager.start_room("r1").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    manager.mark_live("r1").await?;

    // Write three segments plus the live playlist the watcher parses.
    let session_dir = dir.path().join("hls").join("room_r1").join(&session_id);
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..3u32 {
        let name = format!("segment_{i:03}.ts");
        tokio::fs::write(session_dir.join(&name), vec![7u8; 256]).await?;
        playlist.push_str(&format!("#EXTINF:4.00{i},\n{name}\n"));
    }
    tokio::fs::write(session_dir.join("stream.m3u8"), &playlist).await?;

    // Give the watcher time to discover and upload all three.
    let store_playlist =
        dir.path().join("store").join("vod").join("room_r1").join(&session_id).join("stream.m3u8");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let segments_stored = (0..3).all(|i| {
            dir.path()
                .join("store/vod/room_r1")
                .join(&session_id)
                .join(format!("segment_{i:03}.ts"))
                .is_file()
        });
        if segments_stored {
            break;
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "segments never uploaded");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let url = manager
        .finalize_room("r1")
        .await?
        .ok_or_else(|| anyhow::anyhow!("no active session"))?;
    assert!(url.contains("stream.m3u8"));

    let final_m3u8 = tokio::fs::read_to_string(&store_playlist).await?;
    assert!(final_m3u8.ends_with("#EXT-X-ENDLIST\n"));
    assert_eq!(final_m3u8.matches("#EXTINF:").count(), 3);
    assert!(final_m3u8.contains("#EXT-X-MEDIA-SEQUENCE:0"));

    // Local dir removed, session record gone, room can start again.
    assert!(!session_dir.exists());
    assert_eq!(manager.list_room_vods("r1").await?, vec![session_id]);
    assert!(manager.start_room("r1").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn finalize_without_session_is_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path());
    assert!(manager.finalize_room("r1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn vods_list_newest_first() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manager = manager(dir.path());
    let storage = Storage::Local(LocalStorage::new(dir.path().join("store"), "http://cdn.test"));
    for session in ["2024-01-01T00-00-00Z", "2024-03-01T00-00-00Z", "2024-02-01T00-00-00Z"] {
        storage
            .put_bytes(
                &format!("vod/room_rX/{session}/stream.m3u8"),
                b"#EXTM3U\n".to_vec(),
                "application/vnd.apple.mpegurl",
            )
            .await?;
    }

    assert_eq!(
        manager.list_room_vods("rX").await?,
        vec!["2024-03-01T00-00-00Z", "2024-02-01T00-00-00Z", "2024-01-01T00-00-00Z"]
    );
    Ok(())
}
