// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use skein_core::config::{BusConfig, KafkaConfig, LogConfig, RedisConfig, WsConfig};

/// Configuration for the presence service.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "skein-presence", version, about = "Room presence and live-status tracking.")]
pub struct PresenceConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "SKEIN_PRESENCE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8084, env = "SKEIN_PRESENCE_PORT")]
    pub port: u16,

    /// Base URL of the external auth service.
    #[arg(long, default_value = "http://127.0.0.1:8100", env = "SKEIN_AUTH_URL")]
    pub auth_url: String,

    /// Maximum WebSocket frame size in bytes.
    #[arg(long, default_value_t = 4096, env = "SKEIN_PRESENCE_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,

    /// Store backend: "redis" or "memory" (single instance).
    #[arg(long = "presence-store", default_value = "redis", env = "SKEIN_PRESENCE_STORE")]
    pub store_type: String,

    /// TTL on presence entries; a client silent this long is gone.
    #[arg(long, default_value_t = 60, env = "SKEIN_PRESENCE_HEARTBEAT_TIMEOUT_SECS")]
    pub heartbeat_timeout_secs: u64,

    /// How long a disconnected broadcaster may reconnect before the room
    /// flips offline.
    #[arg(long, default_value_t = 60, env = "SKEIN_PRESENCE_GRACE_PERIOD_SECS")]
    pub grace_period_secs: u64,

    /// Interval for periodic count re-broadcasts.
    #[arg(long, default_value_t = 10, env = "SKEIN_PRESENCE_BROADCAST_INTERVAL_SECS")]
    pub broadcast_interval_secs: u64,

    #[command(flatten)]
    pub redis: RedisConfig,

    #[command(flatten)]
    pub bus: BusConfig,

    #[command(flatten)]
    pub kafka: KafkaConfig,

    #[command(flatten)]
    pub ws: WsConfig,

    #[command(flatten)]
    pub log: LogConfig,
}

impl PresenceConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }
}
