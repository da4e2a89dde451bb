// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The media worker: one WebRTC ingest peer per broadcaster, feeding the HLS
//! encoder and (optionally) a VOD recording.
//!
//! Consumes `signal:room:*:to_media` and dispatches by event type. Events for
//! one room arrive in publish order, so the handler runs them sequentially.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Barrier, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use skein_core::bus::EventBus;
use skein_core::event::{self, Event};

use crate::config::MediaConfig;
use crate::hls::{HlsSupervisor, VideoFormat};
use crate::ingest;
use crate::peer::offer_has_audio;
use crate::preview;
use crate::storage::Storage;
use crate::vod::{StartError, VodManager};

/// Wait for the encoder to cut its first segment before announcing the URL.
const FIRST_SEGMENT_WAIT: Duration = Duration::from_secs(2);

/// Keyframe request cadence while a video track is live.
const PLI_INTERVAL: Duration = Duration::from_secs(3);

struct RoomPeer {
    peer: Arc<RTCPeerConnection>,
    has_audio: bool,
    /// Rendezvous for the two pipe writers in A/V mode.
    barrier: Option<Arc<Barrier>>,
    /// Set once the encoder starts; the audio ingest waits on it.
    audio_pipe_tx: watch::Sender<Option<PathBuf>>,
    /// Cancels ingest, previews, and keyframe requests for this session.
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct MediaWorker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    config: MediaConfig,
    api: API,
    bus: EventBus,
    hls: HlsSupervisor,
    vod: VodManager,
    storage: Storage,
    peers: Mutex<HashMap<String, Arc<RoomPeer>>>,
    shutdown: CancellationToken,
}

impl MediaWorker {
    pub fn new(
        config: MediaConfig,
        api: API,
        bus: EventBus,
        hls: HlsSupervisor,
        vod: VodManager,
        storage: Storage,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                config,
                api,
                bus,
                hls,
                vod,
                storage,
                peers: Mutex::new(HashMap::new()),
                shutdown,
            }),
        }
    }

    /// Consume signaling events until shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut sub = self
            .inner
            .bus
            .subscribe_pattern("signal:room:*:to_media")
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        info!("media worker subscribed to signaling events");

        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                event = sub.recv() => {
                    let Some(event) = event else { break };
                    self.dispatch(event).await;
                }
            }
        }

        self.inner.hls.stop_all().await;
        Ok(())
    }

    async fn dispatch(&self, event: Event) {
        let room_id = event.room_id.clone();
        match event.kind.as_str() {
            event::START_BROADCAST => {
                if let Err(e) = self.handle_start_broadcast(&room_id, &event).await {
                    error!(room_id, err = %e, "start_broadcast failed");
                    self.publish_signal(&room_id, event::STREAM_ENDED, serde_json::json!({}))
                        .await;
                }
            }
            event::ICE_CANDIDATE => self.handle_ice_candidate(&room_id, &event).await,
            event::STOP_BROADCAST => {
                let reason = event.payload_str("reason").to_owned();
                self.handle_stop_broadcast(&room_id, &reason).await;
            }
            other => warn!(room_id, kind = other, "unknown signaling event"),
        }
    }

    async fn handle_start_broadcast(&self, room_id: &str, event: &Event) -> anyhow::Result<()> {
        let offer_sdp = event.payload_str("offer").to_owned();
        anyhow::ensure!(!offer_sdp.is_empty(), "start_broadcast without an offer");

        {
            let peers = self.inner.peers.lock().await;
            if peers.contains_key(room_id) {
                anyhow::bail!("peer already exists for room");
            }
        }

        let peer = Arc::new(
            self.inner
                .api
                .new_peer_connection(crate::peer::rtc_config(&self.inner.config.stun_server))
                .await?,
        );
        let has_audio = offer_has_audio(&offer_sdp);
        let (audio_pipe_tx, _) = watch::channel(None);
        let entry = Arc::new(RoomPeer {
            peer: Arc::clone(&peer),
            has_audio,
            barrier: has_audio.then(|| Arc::new(Barrier::new(2))),
            audio_pipe_tx,
            cancel: CancellationToken::new(),
        });
        self.inner.peers.lock().await.insert(room_id.to_owned(), Arc::clone(&entry));

        // Incoming tracks start the pipeline.
        let worker = self.clone();
        let track_room = room_id.to_owned();
        let track_entry = Arc::clone(&entry);
        peer.on_track(Box::new(move |track, _receiver, _transceiver| {
            let worker = worker.clone();
            let room_id = track_room.clone();
            let entry = Arc::clone(&track_entry);
            // Ingest loops for the life of the track; never run it on the
            // peer's callback path.
            tokio::spawn(async move {
                worker.on_track(room_id, entry, track).await;
            });
            Box::pin(async {})
        }));

        // Locally gathered candidates flow back to the broadcaster.
        let worker = self.clone();
        let ice_room = room_id.to_owned();
        peer.on_ice_candidate(Box::new(move |candidate| {
            let worker = worker.clone();
            let room_id = ice_room.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(json) = candidate.to_json() else { return };
                worker
                    .publish_signal(
                        &room_id,
                        event::SERVER_ICE_CANDIDATE,
                        serde_json::json!({
                            "candidate": json.candidate,
                            "sdp_mid": json.sdp_mid,
                            "sdp_mline_index": json.sdp_mline_index,
                        }),
                    )
                    .await;
            })
        }));

        // A failed or closed peer tears the whole session down.
        let worker = self.clone();
        let state_room = room_id.to_owned();
        peer.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let worker = worker.clone();
            let room_id = state_room.clone();
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Failed => {
                        worker.handle_stop_broadcast(&room_id, "connection_failed").await;
                    }
                    RTCPeerConnectionState::Closed => {
                        worker.handle_stop_broadcast(&room_id, "connection_closed").await;
                    }
                    _ => {}
                }
            })
        }));

        let offer = RTCSessionDescription::offer(offer_sdp)?;
        peer.set_remote_description(offer).await?;
        let answer = peer.create_answer(None).await?;
        peer.set_local_description(answer.clone()).await?;

        self.publish_signal(
            room_id,
            event::BROADCAST_ANSWER,
            serde_json::json!({ "answer": answer.sdp }),
        )
        .await;
        info!(room_id, has_audio, "broadcast negotiated");
        Ok(())
    }

    async fn handle_ice_candidate(&self, room_id: &str, event: &Event) {
        let entry = self.inner.peers.lock().await.get(room_id).map(Arc::clone);
        let Some(entry) = entry else {
            debug!(room_id, "ice candidate for unknown room");
            return;
        };
        let init = RTCIceCandidateInit {
            candidate: event.payload_str("candidate").to_owned(),
            sdp_mid: event.payload.get("sdp_mid").and_then(|v| v.as_str()).map(str::to_owned),
            sdp_mline_index: event
                .payload
                .get("sdp_mline_index")
                .and_then(|v| v.as_u64())
                .map(|v| v as u16),
            ..Default::default()
        };
        if let Err(e) = entry.peer.add_ice_candidate(init).await {
            debug!(room_id, err = %e, "add_ice_candidate failed");
        }
    }

    /// Tear down a room's pipeline and announce the end of the stream.
    pub async fn handle_stop_broadcast(&self, room_id: &str, reason: &str) {
        let Some(entry) = self.inner.peers.lock().await.remove(room_id) else {
            return;
        };
        info!(room_id, reason, "stopping broadcast");

        entry.cancel.cancel();
        if let Err(e) = entry.peer.close().await {
            debug!(room_id, err = %e, "peer close failed");
        }
        self.inner.hls.stop(room_id).await;

        if self.inner.vod.enabled() {
            let vod = self.inner.vod.clone();
            let room = room_id.to_owned();
            tokio::spawn(async move {
                if let Err(e) = vod.finalize_room(&room).await {
                    warn!(room_id = room, err = %e, "vod finalization failed");
                }
            });
        }

        self.publish_signal(room_id, event::STREAM_ENDED, serde_json::json!({ "reason": reason }))
            .await;
    }

    async fn on_track(&self, room_id: String, entry: Arc<RoomPeer>, track: Arc<TrackRemote>) {
        let codec = track.codec();
        let mime = codec.capability.mime_type.clone();
        info!(room_id, mime, "track arrived");

        match track.kind() {
            RTPCodecType::Video => self.on_video_track(room_id, entry, track, mime).await,
            RTPCodecType::Audio => self.on_audio_track(room_id, entry, track).await,
            _ => {}
        }
    }

    async fn on_video_track(
        &self,
        room_id: String,
        entry: Arc<RoomPeer>,
        track: Arc<TrackRemote>,
        mime: String,
    ) {
        // The first video track opens the session: VOD record, encoder, URL
        // announcement, previews.
        let vod_active = self.inner.vod.enabled();
        let session_id = if vod_active {
            match self.inner.vod.start_room(&room_id).await {
                Ok(id) => id,
                Err(StartError::Conflict) => {
                    warn!(room_id, "vod session still active, rejecting track");
                    return;
                }
                Err(StartError::Failed(e)) => {
                    error!(room_id, err = %e, "vod start failed");
                    return;
                }
            }
        } else {
            crate::vod::store::session_id_at(chrono::Utc::now())
        };

        let dir = self.inner.config.hls.session_dir(&room_id, &session_id);
        let format = if mime.eq_ignore_ascii_case("video/h264") {
            VideoFormat::AnnexB
        } else {
            VideoFormat::Ivf
        };

        let outcome = match self
            .inner
            .hls
            .start(&room_id, &session_id, &dir, format, entry.has_audio, vod_active)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(room_id, err = %e, "encoder start rejected");
                return;
            }
        };

        if vod_active {
            if let Err(e) = self.inner.vod.mark_live(&room_id).await {
                warn!(room_id, err = %e, "session live transition failed");
            }
        }

        // Keyframe requests keep the encoder recoverable through loss.
        self.spawn_pli_loop(&entry, track.ssrc(), outcome.done.clone());

        // Announce the playback URL once the first segment exists.
        let worker = self.clone();
        let ready_room = room_id.clone();
        let ready_session = session_id.clone();
        let ready_cancel = entry.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ready_cancel.cancelled() => {}
                _ = tokio::time::sleep(FIRST_SEGMENT_WAIT) => {
                    let hls_url = format!("/live/{ready_room}/{ready_session}/stream.m3u8");
                    worker
                        .publish_signal(
                            &ready_room,
                            event::STREAM_READY,
                            serde_json::json!({ "hls_url": hls_url, "session_id": ready_session }),
                        )
                        .await;
                }
            }
        });

        if self.inner.config.preview.preview_enabled {
            preview::spawn(
                self.inner.config.preview.clone(),
                self.inner.config.ffmpeg.ffmpeg_bin.clone(),
                dir.join("stream.m3u8"),
                self.inner.storage.clone(),
                room_id.clone(),
                session_id.clone(),
                entry.cancel.clone(),
                outcome.done.clone(),
            );
        }

        // Feed the encoder: stdin in video-only mode, the video pipe in A/V
        // mode. The pipe writers rendezvous at the barrier BEFORE opening —
        // the encoder probes its inputs in order, so both FIFOs must come up
        // together with data following immediately.
        let width = self.inner.config.ffmpeg.ffmpeg_width as u16;
        let height = self.inner.config.ffmpeg.ffmpeg_height as u16;
        let cancel = entry.cancel.clone();

        if let Some(stdin) = outcome.stdin {
            let result =
                ingest::run_video_ingest(track, mime, width, height, stdin, cancel).await;
            if let Err(e) = result {
                debug!(room_id, err = %e, "video ingest ended");
            }
        } else if let Some(ref video_pipe) = outcome.video_pipe {
            entry.audio_pipe_tx.send_replace(outcome.audio_pipe.clone());
            if let Some(ref barrier) = entry.barrier {
                barrier.wait().await;
            }
            let writer = match tokio::fs::OpenOptions::new().write(true).open(video_pipe).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(room_id, err = %e, "video pipe open failed");
                    return;
                }
            };
            let result =
                ingest::run_video_ingest(track, mime, width, height, writer, cancel).await;
            if let Err(e) = result {
                debug!(room_id, err = %e, "video ingest ended");
            }
        }
    }

    async fn on_audio_track(
        &self,
        room_id: String,
        entry: Arc<RoomPeer>,
        track: Arc<TrackRemote>,
    ) {
        if !entry.has_audio {
            warn!(room_id, "audio track without an audio section in the offer");
            return;
        }

        // The encoder (and its pipes) appear when the video track lands.
        let mut pipe_rx = entry.audio_pipe_tx.subscribe();
        let audio_pipe = loop {
            if let Some(path) = pipe_rx.borrow().clone() {
                break path;
            }
            tokio::select! {
                _ = entry.cancel.cancelled() => return,
                changed = pipe_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        };

        if let Some(ref barrier) = entry.barrier {
            barrier.wait().await;
        }
        let writer = match tokio::fs::OpenOptions::new().write(true).open(&audio_pipe).await {
            Ok(f) => f,
            Err(e) => {
                warn!(room_id, err = %e, "audio pipe open failed");
                return;
            }
        };

        let result = ingest::run_audio_ingest(track, writer, entry.cancel.clone()).await;
        if let Err(e) = result {
            debug!(room_id, err = %e, "audio ingest ended");
        }
    }

    fn spawn_pli_loop(&self, entry: &Arc<RoomPeer>, media_ssrc: u32, done: CancellationToken) {
        let peer = Arc::clone(&entry.peer);
        let cancel = entry.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PLI_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = done.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let pli: [Box<dyn webrtc::rtcp::packet::Packet + Send + Sync>; 1] =
                    [Box::new(PictureLossIndication { sender_ssrc: 0, media_ssrc })];
                if peer.write_rtcp(&pli).await.is_err() {
                    break;
                }
            }
        });
    }

    async fn publish_signal(&self, room_id: &str, kind: &str, payload: serde_json::Value) {
        let event = Event::new(kind, room_id, payload);
        if let Err(e) = self.inner.bus.publish(&event::to_signal(room_id), &event).await {
            warn!(room_id, kind, err = %e, "signal publish failed");
        }
    }
}
