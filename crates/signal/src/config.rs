// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use skein_core::config::{BusConfig, KafkaConfig, LogConfig, WsConfig};

/// Configuration for the signaling coordinator.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "skein-signal", version, about = "WebSocket signaling coordinator.")]
pub struct SignalConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "SKEIN_SIGNAL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "SKEIN_SIGNAL_PORT")]
    pub port: u16,

    /// Base URL of the external auth service.
    #[arg(long, default_value = "http://127.0.0.1:8100", env = "SKEIN_AUTH_URL")]
    pub auth_url: String,

    /// Base URL of the external room directory.
    #[arg(long, default_value = "http://127.0.0.1:8101", env = "SKEIN_ROOMS_URL")]
    pub rooms_url: String,

    /// Maximum WebSocket frame size in bytes.
    #[arg(long, default_value_t = 65536, env = "SKEIN_SIGNAL_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,

    #[command(flatten)]
    pub bus: BusConfig,

    #[command(flatten)]
    pub kafka: KafkaConfig,

    #[command(flatten)]
    pub ws: WsConfig,

    #[command(flatten)]
    pub log: LogConfig,
}
