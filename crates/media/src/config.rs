// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use skein_core::config::{BusConfig, KafkaConfig, LogConfig, RedisConfig};

/// Configuration for the media worker.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "skein-media", version, about = "WebRTC media worker and HLS supervisor.")]
pub struct MediaConfig {
    /// Host to bind the playback/health HTTP server on.
    #[arg(long, default_value = "0.0.0.0", env = "SKEIN_MEDIA_HOST")]
    pub host: String,

    /// Port for the playback/health HTTP server.
    #[arg(long, default_value_t = 8090, env = "SKEIN_MEDIA_PORT")]
    pub port: u16,

    /// STUN server for the WebRTC peer.
    #[arg(long, default_value = "stun:stun.l.google.com:19302", env = "SKEIN_STUN_SERVER")]
    pub stun_server: String,

    #[command(flatten)]
    pub hls: HlsConfig,

    #[command(flatten)]
    pub ffmpeg: FfmpegConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub vod: VodConfig,

    #[command(flatten)]
    pub session: SessionStoreConfig,

    #[command(flatten)]
    pub preview: PreviewConfig,

    #[command(flatten)]
    pub bus: BusConfig,

    #[command(flatten)]
    pub kafka: KafkaConfig,

    #[command(flatten)]
    pub redis: RedisConfig,

    #[command(flatten)]
    pub log: LogConfig,
}

/// HLS output options.
#[derive(Debug, Clone, clap::Args)]
pub struct HlsConfig {
    /// Root directory for live HLS output.
    #[arg(long, default_value = "./hls", env = "SKEIN_HLS_OUTPUT_DIR")]
    pub hls_output_dir: PathBuf,

    /// Target segment duration in seconds.
    #[arg(long, default_value_t = 4, env = "SKEIN_HLS_SEGMENT_DURATION_SECS")]
    pub hls_segment_duration_secs: u32,

    /// Live playlist window (number of segments).
    #[arg(long, default_value_t = 6, env = "SKEIN_HLS_PLAYLIST_SIZE")]
    pub hls_playlist_size: u32,

    /// Delete segments that fall out of the live window. Forced off while a
    /// VOD session is recording, which needs every segment on disk.
    #[arg(long, default_value_t = false, env = "SKEIN_HLS_DELETE_SEGMENTS")]
    pub hls_delete_segments: bool,
}

impl HlsConfig {
    /// Directory for one session's output.
    pub fn session_dir(&self, room_id: &str, session_id: &str) -> PathBuf {
        self.hls_output_dir.join(format!("room_{room_id}")).join(session_id)
    }
}

/// Encoder subprocess options.
#[derive(Debug, Clone, clap::Args)]
pub struct FfmpegConfig {
    /// Path to the ffmpeg binary.
    #[arg(long, default_value = "ffmpeg", env = "SKEIN_FFMPEG_BIN")]
    pub ffmpeg_bin: String,

    #[arg(long, default_value = "libx264", env = "SKEIN_FFMPEG_VIDEO_CODEC")]
    pub ffmpeg_video_codec: String,

    #[arg(long, default_value = "veryfast", env = "SKEIN_FFMPEG_VIDEO_PRESET")]
    pub ffmpeg_video_preset: String,

    #[arg(long, default_value = "2500k", env = "SKEIN_FFMPEG_VIDEO_BITRATE")]
    pub ffmpeg_video_bitrate: String,

    #[arg(long, default_value_t = 23, env = "SKEIN_FFMPEG_VIDEO_CRF")]
    pub ffmpeg_video_crf: u32,

    #[arg(long, default_value_t = 1280, env = "SKEIN_FFMPEG_WIDTH")]
    pub ffmpeg_width: u32,

    #[arg(long, default_value_t = 720, env = "SKEIN_FFMPEG_HEIGHT")]
    pub ffmpeg_height: u32,

    #[arg(long, default_value_t = 30, env = "SKEIN_FFMPEG_FRAMERATE")]
    pub ffmpeg_framerate: u32,

    #[arg(long, default_value = "aac", env = "SKEIN_FFMPEG_AUDIO_CODEC")]
    pub ffmpeg_audio_codec: String,

    #[arg(long, default_value = "128k", env = "SKEIN_FFMPEG_AUDIO_BITRATE")]
    pub ffmpeg_audio_bitrate: String,

    #[arg(long, default_value_t = 44100, env = "SKEIN_FFMPEG_AUDIO_SAMPLE")]
    pub ffmpeg_audio_sample: u32,
}

/// Object storage selection and options.
#[derive(Debug, Clone, clap::Args)]
pub struct StorageConfig {
    /// Storage backend: "local" or "s3".
    #[arg(long = "storage", default_value = "local", env = "SKEIN_STORAGE")]
    pub storage_type: String,

    /// Base path for the local backend.
    #[arg(long, default_value = "./storage", env = "SKEIN_STORAGE_BASE_PATH")]
    pub storage_base_path: PathBuf,

    /// Public URL base the local backend serves under.
    #[arg(long, default_value = "http://127.0.0.1:8090", env = "SKEIN_STORAGE_PUBLIC_URL")]
    pub storage_public_url: String,

    /// S3 endpoint override (e.g. a MinIO URL).
    #[arg(long, env = "SKEIN_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, default_value = "us-east-1", env = "SKEIN_S3_REGION")]
    pub s3_region: String,

    #[arg(long, default_value = "skein-vod", env = "SKEIN_S3_BUCKET")]
    pub s3_bucket: String,

    #[arg(long, env = "SKEIN_S3_ACCESS_KEY_ID")]
    pub s3_access_key_id: Option<String>,

    #[arg(long, env = "SKEIN_S3_SECRET_ACCESS_KEY")]
    pub s3_secret_access_key: Option<String>,

    /// Use path-style addressing (required by MinIO).
    #[arg(long, default_value_t = false, env = "SKEIN_S3_USE_PATH_STYLE")]
    pub s3_use_path_style: bool,

    /// Public URL base for S3-hosted objects (CDN front).
    #[arg(long, env = "SKEIN_S3_PUBLIC_URL")]
    pub s3_public_url: Option<String>,
}

/// VOD recording options.
#[derive(Debug, Clone, clap::Args)]
pub struct VodConfig {
    /// Record broadcasts as VODs.
    #[arg(long, default_value_t = true, env = "SKEIN_VOD_ENABLED")]
    pub vod_enabled: bool,

    /// Upload worker count.
    #[arg(long, default_value_t = 4, env = "SKEIN_VOD_UPLOAD_WORKERS")]
    pub vod_upload_workers: usize,
}

/// VOD session store selection.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionStoreConfig {
    /// Session store backend: "memory" or "redis".
    #[arg(long = "session-store", default_value = "memory", env = "SKEIN_SESSION_STORE")]
    pub session_store_type: String,

    /// Key prefix for the redis backend.
    #[arg(long, default_value = "vod", env = "SKEIN_SESSION_KEY_PREFIX")]
    pub session_key_prefix: String,

    /// TTL safety net on redis session records, in seconds.
    #[arg(long, default_value_t = 86400, env = "SKEIN_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,
}

impl SessionStoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Preview thumbnail options.
#[derive(Debug, Clone, clap::Args)]
pub struct PreviewConfig {
    #[arg(long, default_value_t = true, env = "SKEIN_PREVIEW_ENABLED")]
    pub preview_enabled: bool,

    /// Capture interval in seconds.
    #[arg(long, default_value_t = 30, env = "SKEIN_PREVIEW_INTERVAL_SECS")]
    pub preview_interval_secs: u64,

    /// Delay before the first capture, in seconds.
    #[arg(long, default_value_t = 10, env = "SKEIN_PREVIEW_INITIAL_DELAY_SECS")]
    pub preview_initial_delay_secs: u64,

    #[arg(long, default_value_t = 320, env = "SKEIN_PREVIEW_WIDTH")]
    pub preview_width: u32,

    #[arg(long, default_value_t = 180, env = "SKEIN_PREVIEW_HEIGHT")]
    pub preview_height: u32,

    /// JPEG quality (ffmpeg `-q:v`, lower is better).
    #[arg(long, default_value_t = 5, env = "SKEIN_PREVIEW_QUALITY")]
    pub preview_quality: u32,
}

impl PreviewConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.preview_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.preview_initial_delay_secs)
    }
}
