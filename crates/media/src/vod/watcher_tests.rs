// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{parse_playlist, segment_index, SegmentWatcher};

#[test]
fn parses_extinf_and_segment_pairs() {
    let playlist = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:4\n\
        #EXT-X-MEDIA-SEQUENCE:0\n\
        #EXTINF:4.004,\n\
        segment_000.ts\n\
        #EXTINF:3.970,\n\
        segment_001.ts\n";
    let entries = parse_playlist(playlist);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "segment_000.ts");
    assert!((entries[0].1 - 4.004).abs() < 1e-9);
    assert_eq!(entries[1].0, "segment_001.ts");
}

#[test]
fn playlist_without_segments_is_empty() {
    assert!(parse_playlist("#EXTM3U\n#EXT-X-VERSION:3\n").is_empty());
    // A bare .ts line with no preceding EXTINF is not a segment entry.
    assert!(parse_playlist("segment_000.ts\n").is_empty());
}

#[test]
fn segment_index_parses_the_captured_integer() {
    assert_eq!(segment_index("segment_000.ts"), Some(0));
    assert_eq!(segment_index("segment_042.ts"), Some(42));
    assert_eq!(segment_index("segment_1234.ts"), Some(1234));
    assert_eq!(segment_index("preview.ts"), None);
    assert_eq!(segment_index("segment_.ts"), None);
    assert_eq!(segment_index("segment_01.mp4"), None);
}

#[tokio::test]
async fn watcher_reports_stable_segments_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    tokio::fs::write(dir.path().join("segment_000.ts"), vec![0u8; 1024]).await?;
    tokio::fs::write(
        dir.path().join("stream.m3u8"),
        "#EXTM3U\n#EXTINF:4.000,\nsegment_000.ts\n",
    )
    .await?;

    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let watcher = SegmentWatcher::new(dir.path().to_path_buf());
    let task = tokio::spawn(watcher.run(tx, cancel.clone()));

    let info = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("watcher ended early"))?;
    assert_eq!(info.index, 0);
    assert_eq!(info.filename, "segment_000.ts");
    assert!((info.duration - 4.0).abs() < 1e-9);

    // No duplicate report for the same segment.
    let dup = tokio::time::timeout(Duration::from_millis(1200), rx.recv()).await;
    assert!(dup.is_err(), "segment must be reported exactly once");

    cancel.cancel();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn watcher_waits_for_size_stability() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let seg = dir.path().join("segment_000.ts");
    tokio::fs::write(&seg, vec![0u8; 512]).await?;
    tokio::fs::write(
        dir.path().join("stream.m3u8"),
        "#EXTM3U\n#EXTINF:4.000,\nsegment_000.ts\n",
    )
    .await?;

    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(SegmentWatcher::new(dir.path().to_path_buf()).run(tx, cancel.clone()));

    // Keep growing the file briefly; the watcher must not report while the
    // size is still moving.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::fs::write(&seg, vec![0u8; 2048]).await?;

    let info = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("watcher ended early"))?;
    let final_size = tokio::fs::metadata(&seg).await?.len();
    assert_eq!(final_size, 2048, "report must come after the final write");
    assert_eq!(info.index, 0);

    cancel.cancel();
    let _ = task.await;
    Ok(())
}
