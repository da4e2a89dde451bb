// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VOD recording: session lifecycle, segment collection, incremental upload,
//! and finalization.
//!
//! One active recording per room. The segment watcher feeds completed `.ts`
//! files into the upload pool; each successful segment upload re-publishes
//! the (non-final) playlist so a VOD becomes watchable while the broadcast is
//! still running. Finalization drains in-flight uploads within a bound,
//! writes the `ENDLIST` playlist, cleans the local directory, and hands back
//! a day-long presigned URL.

pub mod playlist;
pub mod store;
pub mod upload;
pub mod watcher;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{HlsConfig, VodConfig};
use crate::storage::Storage;

use playlist::{PlaylistBuilder, VodSegment};
use store::{SessionState, SessionStore, VodSession};
use upload::{UploadJob, UploadOutcome, UploadPool};
use watcher::{SegmentInfo, SegmentWatcher};

/// Presigned VOD URLs stay valid this long.
const VOD_URL_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Bound on waiting for in-flight uploads during finalization.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Starting a session can fail because one is already running.
#[derive(Debug)]
pub enum StartError {
    /// The room already has a non-completed session.
    Conflict,
    Failed(anyhow::Error),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict => f.write_str("session still active"),
            Self::Failed(e) => write!(f, "{e:#}"),
        }
    }
}

struct ActiveVod {
    session: VodSession,
    playlist: Mutex<PlaylistBuilder>,
    watcher_cancel: CancellationToken,
    inflight: AtomicUsize,
}

#[derive(Clone)]
pub struct VodManager {
    hls: HlsConfig,
    enabled: bool,
    store: SessionStore,
    storage: Storage,
    pool: UploadPool,
    active: Arc<RwLock<HashMap<String, Arc<ActiveVod>>>>,
}

impl VodManager {
    pub fn new(
        hls: HlsConfig,
        vod: &VodConfig,
        store: SessionStore,
        storage: Storage,
        shutdown: CancellationToken,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(upload::QUEUE_CAP);
        let pool =
            UploadPool::spawn(storage.clone(), vod.vod_upload_workers, outcome_tx, shutdown);
        let manager = Self {
            hls,
            enabled: vod.vod_enabled,
            store,
            storage,
            pool,
            active: Arc::new(RwLock::new(HashMap::new())),
        };
        manager.spawn_outcome_consumer(outcome_rx);
        manager
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Begin recording a room. Returns the new session ID.
    pub async fn start_room(&self, room_id: &str) -> Result<String, StartError> {
        match self.store.get(room_id).await {
            Ok(Some(existing)) if existing.state != SessionState::Completed => {
                return Err(StartError::Conflict);
            }
            Ok(_) => {}
            Err(e) => return Err(StartError::Failed(e)),
        }

        let session_id = store::session_id_at(chrono::Utc::now());
        let local_dir = self.hls.session_dir(room_id, &session_id);
        tokio::fs::create_dir_all(&local_dir).await.map_err(|e| StartError::Failed(e.into()))?;

        let session = VodSession::new(room_id, &session_id, local_dir.clone());
        self.store.save(&session).await.map_err(StartError::Failed)?;

        let entry = Arc::new(ActiveVod {
            session,
            playlist: Mutex::new(PlaylistBuilder::new(self.hls.hls_segment_duration_secs)),
            watcher_cancel: CancellationToken::new(),
            inflight: AtomicUsize::new(0),
        });
        self.active.write().await.insert(room_id.to_owned(), Arc::clone(&entry));

        let (segment_tx, segment_rx) = mpsc::channel::<SegmentInfo>(64);
        tokio::spawn(
            SegmentWatcher::new(local_dir).run(segment_tx, entry.watcher_cancel.clone()),
        );
        self.spawn_segment_consumer(room_id.to_owned(), segment_rx);

        info!(room_id, session_id, "vod session started");
        Ok(session_id)
    }

    /// The encoder is up; the session is live.
    pub async fn mark_live(&self, room_id: &str) -> anyhow::Result<()> {
        if let Some(mut session) = self.store.get(room_id).await? {
            if session.state.can_transition_to(SessionState::Live) {
                session.state = SessionState::Live;
                self.store.save(&session).await?;
            }
        }
        Ok(())
    }

    /// Stop recording: drain, finalize, clean up. Returns the playback URL of
    /// the finished VOD, or `None` when the room had no active session.
    pub async fn finalize_room(&self, room_id: &str) -> anyhow::Result<Option<String>> {
        let Some(entry) = self.active.write().await.remove(room_id) else {
            return Ok(None);
        };
        entry.watcher_cancel.cancel();

        let mut session = match self.store.get(room_id).await? {
            Some(s) => s,
            None => entry.session.clone(),
        };
        session.state = SessionState::Finalizing;
        self.store.save(&session).await?;

        // Bounded drain of in-flight segment uploads.
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while entry.inflight.load(Ordering::Acquire) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    room_id,
                    pending = entry.inflight.load(Ordering::Acquire),
                    "finalizing with uploads still in flight"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let playlist_key = format!("{}/stream.m3u8", session.storage_prefix);
        let final_m3u8 = entry.playlist.lock().await.generate_m3u8(true);
        self.storage
            .put_bytes(&playlist_key, final_m3u8.into_bytes(), "application/vnd.apple.mpegurl")
            .await?;

        if let Err(e) = tokio::fs::remove_dir_all(&session.local_dir).await {
            warn!(room_id, err = %e, "local session dir cleanup failed");
        }

        session.state = SessionState::Completed;
        self.store.save(&session).await?;
        self.store.delete(room_id).await?;

        let url = self.storage.presign_get(&playlist_key, VOD_URL_EXPIRY).await?;
        info!(room_id, session_id = %session.session_id, "vod finalized");
        Ok(Some(url))
    }

    /// Completed VOD session IDs for a room, newest first.
    pub async fn list_room_vods(&self, room_id: &str) -> anyhow::Result<Vec<String>> {
        let mut sessions = self.storage.list_prefixes(&format!("vod/room_{room_id}")).await?;
        sessions.sort_by(|a, b| b.cmp(a));
        Ok(sessions)
    }

    /// Forward watcher discoveries into the playlist and the upload queue.
    fn spawn_segment_consumer(&self, room_id: String, mut segment_rx: mpsc::Receiver<SegmentInfo>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(info) = segment_rx.recv().await {
                let Some(entry) = manager.active.read().await.get(&room_id).map(Arc::clone)
                else {
                    break;
                };

                let remote_key = format!("{}/{}", entry.session.storage_prefix, info.filename);
                entry.playlist.lock().await.add_segment(VodSegment {
                    index: info.index,
                    filename: info.filename.clone(),
                    duration: info.duration,
                    uploaded: false,
                    remote_key: None,
                });

                entry.inflight.fetch_add(1, Ordering::AcqRel);
                let job = UploadJob {
                    room_id: room_id.clone(),
                    segment_index: info.index,
                    local_path: info.path,
                    remote_key,
                };
                if manager.pool.enqueue(job).is_err() {
                    entry.inflight.fetch_sub(1, Ordering::AcqRel);
                    warn!(room_id, index = info.index, "upload queue full, segment skipped");
                }
            }
        });
    }

    /// Apply upload outcomes: mark segments uploaded and refresh the
    /// non-final playlist object.
    fn spawn_outcome_consumer(&self, mut outcome_rx: mpsc::Receiver<UploadOutcome>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(outcome) = outcome_rx.recv().await {
                let Some(entry) =
                    manager.active.read().await.get(&outcome.room_id).map(Arc::clone)
                else {
                    continue;
                };
                entry.inflight.fetch_sub(1, Ordering::AcqRel);

                if !outcome.success {
                    continue;
                }

                let live_m3u8 = {
                    let mut playlist = entry.playlist.lock().await;
                    playlist.mark_uploaded(outcome.segment_index, &outcome.remote_key);
                    playlist.generate_m3u8(false)
                };
                let playlist_key = format!("{}/stream.m3u8", entry.session.storage_prefix);
                if let Err(e) = manager
                    .storage
                    .put_bytes(
                        &playlist_key,
                        live_m3u8.into_bytes(),
                        "application/vnd.apple.mpegurl",
                    )
                    .await
                {
                    debug!(room_id = %outcome.room_id, err = %e, "interim playlist upload failed");
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "vod_tests.rs"]
mod tests;
