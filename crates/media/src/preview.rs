// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview thumbnails: periodic frame grabs from the live playlist.
//!
//! Captures depend on a hot encoder; the loop exits with the encoder's done
//! signal and no placeholder is written after a crash.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::storage::Storage;

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    config: PreviewConfig,
    ffmpeg_bin: String,
    playlist: PathBuf,
    storage: Storage,
    room_id: String,
    session_id: String,
    cancel: CancellationToken,
    encoder_done: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = encoder_done.cancelled() => return,
            _ = tokio::time::sleep(config.initial_delay()) => {}
        }

        let remote_key = format!("preview/room_{room_id}/{session_id}/thumbnail.jpg");
        let local = playlist.with_file_name("thumbnail.jpg");
        let mut ticker = tokio::time::interval(config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            match capture(&config, &ffmpeg_bin, &playlist, &local).await {
                Ok(()) => {
                    if let Err(e) = storage.put_file(&local, &remote_key).await {
                        debug!(room_id, err = %e, "thumbnail upload failed");
                    }
                }
                Err(e) => debug!(room_id, err = %e, "thumbnail capture failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = encoder_done.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }
        let _ = tokio::fs::remove_file(&local).await;
        debug!(room_id, "preview capture stopped");
    });
}

async fn capture(
    config: &PreviewConfig,
    ffmpeg_bin: &str,
    playlist: &std::path::Path,
    out: &std::path::Path,
) -> anyhow::Result<()> {
    let status = Command::new(ffmpeg_bin)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-i",
        ])
        .arg(playlist)
        .args([
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={}:{}", config.preview_width, config.preview_height),
            "-q:v",
            &config.preview_quality.to_string(),
        ])
        .arg(out)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        warn!(status = ?status.code(), "thumbnail encoder exited nonzero");
        anyhow::bail!("capture exited with {status}");
    }
    Ok(())
}
