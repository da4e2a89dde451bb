// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HLS encoder subprocess supervision.
//!
//! Exactly one encoder per `(room, session)`. Video-only broadcasts feed the
//! encoder over stdin; audio+video broadcasts feed a pair of named pipes.
//! The wait task reaps the process on exit — for any reason — removing the
//! table entry, deleting pipes, and closing the done signal. Stopping is
//! graceful first (ingest writers drop, the encoder sees EOF), then forced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FfmpegConfig, HlsConfig};

/// Grace between EOF and SIGKILL on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// How the encoder receives video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    /// VP8/VP9 in IVF framing.
    Ivf,
    /// H264 Annex-B byte stream.
    AnnexB,
}

impl VideoFormat {
    fn demuxer(self) -> &'static str {
        match self {
            Self::Ivf => "ivf",
            Self::AnnexB => "h264",
        }
    }
}

#[derive(Debug)]
pub enum HlsError {
    /// An encoder already runs for this room.
    AlreadyRunning,
    Spawn(anyhow::Error),
}

impl std::fmt::Display for HlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => f.write_str("encoder already running"),
            Self::Spawn(e) => write!(f, "{e:#}"),
        }
    }
}

/// Handles returned from a successful start.
pub struct StartOutcome {
    /// Present in stdin mode; the video ingest writer owns it.
    pub stdin: Option<ChildStdin>,
    /// Present in pipe mode.
    pub video_pipe: Option<PathBuf>,
    pub audio_pipe: Option<PathBuf>,
    /// Cancelled once the encoder has exited and been cleaned up.
    pub done: CancellationToken,
}

struct ProcEntry {
    session_id: String,
    stop: CancellationToken,
    done: CancellationToken,
}

#[derive(Clone)]
pub struct HlsSupervisor {
    ffmpeg: FfmpegConfig,
    hls: HlsConfig,
    processes: Arc<Mutex<HashMap<String, ProcEntry>>>,
}

impl HlsSupervisor {
    pub fn new(ffmpeg: FfmpegConfig, hls: HlsConfig) -> Self {
        Self { ffmpeg, hls, processes: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Spawn the encoder for `(room, session)`.
    pub async fn start(
        &self,
        room_id: &str,
        session_id: &str,
        out_dir: &Path,
        video_format: VideoFormat,
        with_audio: bool,
        vod_active: bool,
    ) -> Result<StartOutcome, HlsError> {
        let mut processes = self.processes.lock().await;
        if processes.contains_key(room_id) {
            return Err(HlsError::AlreadyRunning);
        }

        tokio::fs::create_dir_all(out_dir).await.map_err(|e| HlsError::Spawn(e.into()))?;

        let (video_pipe, audio_pipe) = if with_audio {
            let video = out_dir.join("video.pipe");
            let audio = out_dir.join("audio.pipe");
            for pipe in [&video, &audio] {
                let _ = tokio::fs::remove_file(pipe).await;
                nix::unistd::mkfifo(pipe, nix::sys::stat::Mode::from_bits_truncate(0o600))
                    .map_err(|e| HlsError::Spawn(anyhow::anyhow!("mkfifo: {e}")))?;
            }
            (Some(video), Some(audio))
        } else {
            (None, None)
        };

        let args = build_args(
            &self.ffmpeg,
            &self.hls,
            video_format,
            video_pipe.as_deref(),
            audio_pipe.as_deref(),
            out_dir,
            vod_active,
        );
        debug!(room_id, session_id, args = %args.join(" "), "starting encoder");

        let mut command = Command::new(&self.ffmpeg.ffmpeg_bin);
        command
            .args(&args)
            .stdin(if with_audio { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| HlsError::Spawn(e.into()))?;
        let stdin = child.stdin.take();

        let stop = CancellationToken::new();
        let done = CancellationToken::new();
        processes.insert(
            room_id.to_owned(),
            ProcEntry { session_id: session_id.to_owned(), stop: stop.clone(), done: done.clone() },
        );
        drop(processes);

        info!(room_id, session_id, "encoder started");
        self.spawn_wait_task(
            room_id.to_owned(),
            child,
            stop,
            done.clone(),
            video_pipe.clone(),
            audio_pipe.clone(),
        );

        Ok(StartOutcome { stdin, video_pipe, audio_pipe, done })
    }

    /// Stop the encoder for a room: EOF first, SIGKILL after the grace
    /// window. Returns once cleanup has finished (bounded).
    pub async fn stop(&self, room_id: &str) {
        let entry = {
            let processes = self.processes.lock().await;
            processes.get(room_id).map(|e| (e.stop.clone(), e.done.clone()))
        };
        let Some((stop, done)) = entry else { return };
        stop.cancel();
        if tokio::time::timeout(STOP_GRACE + Duration::from_secs(1), done.cancelled())
            .await
            .is_err()
        {
            warn!(room_id, "encoder cleanup timed out");
        }
    }

    /// The session an encoder currently serves for a room, if any.
    pub async fn running_session(&self, room_id: &str) -> Option<String> {
        self.processes.lock().await.get(room_id).map(|e| e.session_id.clone())
    }

    pub async fn stop_all(&self) {
        let rooms: Vec<String> = self.processes.lock().await.keys().cloned().collect();
        for room_id in rooms {
            self.stop(&room_id).await;
        }
    }

    fn spawn_wait_task(
        &self,
        room_id: String,
        mut child: Child,
        stop: CancellationToken,
        done: CancellationToken,
        video_pipe: Option<PathBuf>,
        audio_pipe: Option<PathBuf>,
    ) {
        let processes = Arc::clone(&self.processes);
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => {
                    debug!(room_id, status = ?status.as_ref().ok(), "encoder exited");
                    true
                }
                _ = stop.cancelled() => false,
            };

            if !exited {
                // Ingest writers have dropped; the encoder drains and exits.
                match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                    Ok(status) => {
                        debug!(room_id, status = ?status.ok(), "encoder exited after EOF")
                    }
                    Err(_) => {
                        warn!(room_id, "encoder ignored EOF, killing");
                        let _ = child.kill().await;
                        let _ = child.wait().await;
                    }
                }
            }

            processes.lock().await.remove(&room_id);
            for pipe in [video_pipe, audio_pipe].into_iter().flatten() {
                let _ = tokio::fs::remove_file(pipe).await;
            }
            done.cancel();
            info!(room_id, "encoder reaped");
        });
    }
}

/// Assemble the encoder command line.
fn build_args(
    ffmpeg: &FfmpegConfig,
    hls: &HlsConfig,
    video_format: VideoFormat,
    video_pipe: Option<&Path>,
    audio_pipe: Option<&Path>,
    out_dir: &Path,
    vod_active: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        // Wall-clock stamps plus PTS generation keep A/V in sync across
        // jittery ingest.
        "-use_wallclock_as_timestamps".into(),
        "1".into(),
        "-fflags".into(),
        "+genpts".into(),
    ];

    match (video_pipe, audio_pipe) {
        (Some(video), Some(audio)) => {
            args.extend([
                "-thread_queue_size".into(),
                "512".into(),
                "-f".into(),
                video_format.demuxer().into(),
                "-i".into(),
                video.to_string_lossy().into_owned(),
                "-thread_queue_size".into(),
                "512".into(),
                "-f".into(),
                "ogg".into(),
                "-i".into(),
                audio.to_string_lossy().into_owned(),
                "-c:a".into(),
                ffmpeg.ffmpeg_audio_codec.clone(),
                "-b:a".into(),
                ffmpeg.ffmpeg_audio_bitrate.clone(),
                "-ar".into(),
                ffmpeg.ffmpeg_audio_sample.to_string(),
            ]);
        }
        _ => {
            args.extend([
                "-f".into(),
                video_format.demuxer().into(),
                "-i".into(),
                "pipe:0".into(),
                "-an".into(),
            ]);
        }
    }

    args.extend([
        "-c:v".into(),
        ffmpeg.ffmpeg_video_codec.clone(),
        "-preset".into(),
        ffmpeg.ffmpeg_video_preset.clone(),
        "-b:v".into(),
        ffmpeg.ffmpeg_video_bitrate.clone(),
        "-crf".into(),
        ffmpeg.ffmpeg_video_crf.to_string(),
        "-s".into(),
        format!("{}x{}", ffmpeg.ffmpeg_width, ffmpeg.ffmpeg_height),
        "-r".into(),
        ffmpeg.ffmpeg_framerate.to_string(),
        // Keyframe cadence aligned to the segment length.
        "-g".into(),
        (ffmpeg.ffmpeg_framerate * hls.hls_segment_duration_secs).to_string(),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        hls.hls_segment_duration_secs.to_string(),
        "-hls_list_size".into(),
        hls.hls_playlist_size.to_string(),
    ]);

    if hls.hls_delete_segments && !vod_active {
        args.extend(["-hls_flags".into(), "delete_segments".into()]);
    }

    args.extend([
        "-hls_segment_filename".into(),
        out_dir.join("segment_%03d.ts").to_string_lossy().into_owned(),
        out_dir.join("stream.m3u8").to_string_lossy().into_owned(),
    ]);

    args
}

#[cfg(test)]
#[path = "hls_tests.rs"]
mod tests;
