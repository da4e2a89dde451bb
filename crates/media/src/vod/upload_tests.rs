// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::storage::{LocalStorage, Storage};

use super::{UploadJob, UploadPool};

fn local_storage(dir: &std::path::Path) -> Storage {
    Storage::Local(LocalStorage::new(dir.to_path_buf(), "http://cdn.test"))
}

#[tokio::test]
async fn uploads_flow_through_the_pool() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("segment_000.ts");
    tokio::fs::write(&src, b"data").await?;

    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let pool = UploadPool::spawn(
        local_storage(&dir.path().join("store")),
        2,
        outcome_tx,
        CancellationToken::new(),
    );

    pool.enqueue(UploadJob {
        room_id: "r1".into(),
        segment_index: 0,
        local_path: src,
        remote_key: "vod/room_r1/s1/segment_000.ts".into(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let outcome = tokio::time::timeout(Duration::from_secs(5), outcome_rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("pool ended"))?;
    assert!(outcome.success);
    assert_eq!(outcome.segment_index, 0);

    let stored = tokio::fs::read(dir.path().join("store/vod/room_r1/s1/segment_000.ts")).await?;
    assert_eq!(stored, b"data");
    Ok(())
}

#[tokio::test]
async fn missing_file_reports_failure_after_retries() -> anyhow::Result<()> {
    tokio::time::pause();
    let dir = tempfile::tempdir()?;
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let pool = UploadPool::spawn(
        local_storage(&dir.path().join("store")),
        1,
        outcome_tx,
        CancellationToken::new(),
    );

    pool.enqueue(UploadJob {
        room_id: "r1".into(),
        segment_index: 7,
        local_path: dir.path().join("does-not-exist.ts"),
        remote_key: "vod/room_r1/s1/segment_007.ts".into(),
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let outcome = tokio::time::timeout(Duration::from_secs(30), outcome_rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("pool ended"))?;
    assert!(!outcome.success);
    assert_eq!(outcome.segment_index, 7);
    Ok(())
}
