// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared configuration fragments, flattened into each service's config.

use std::time::Duration;

use crate::bus::{EventBus, FanoutBus, LogBus, MemoryBus};

/// Redis connection options.
#[derive(Debug, Clone, clap::Args)]
pub struct RedisConfig {
    /// Redis URL (`redis://[:password@]host:port/db`).
    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "SKEIN_REDIS_URL")]
    pub redis_url: String,
}

/// Registry options (chat-plane room→instance map).
#[derive(Debug, Clone, clap::Args)]
pub struct RegistryConfig {
    /// Key prefix for registry entries.
    #[arg(long, default_value = "chat", env = "SKEIN_REGISTRY_PREFIX")]
    pub registry_prefix: String,

    /// Registration TTL in seconds.
    #[arg(long, default_value_t = 30, env = "SKEIN_REGISTRY_TTL_SECS")]
    pub registry_ttl_secs: u64,

    /// Heartbeat refresh interval in seconds (clamped below TTL/2).
    #[arg(long, default_value_t = 10, env = "SKEIN_REGISTRY_HEARTBEAT_SECS")]
    pub registry_heartbeat_secs: u64,
}

impl RegistryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.registry_heartbeat_secs)
    }
}

/// Kafka options for the partitioned log.
#[derive(Debug, Clone, clap::Args)]
pub struct KafkaConfig {
    /// Comma-separated broker list.
    #[arg(long, default_value = "127.0.0.1:9092", env = "SKEIN_KAFKA_BROKERS")]
    pub kafka_brokers: String,

    /// Consumer group id shared by pattern subscribers.
    #[arg(long, default_value = "skein", env = "SKEIN_KAFKA_GROUP_ID")]
    pub kafka_group_id: String,

    /// Topic carrying the chat message log.
    #[arg(long, default_value = "chat-messages", env = "SKEIN_KAFKA_CHAT_TOPIC")]
    pub kafka_chat_topic: String,
}

/// Event bus substrate selection.
#[derive(Debug, Clone, clap::Args)]
pub struct BusConfig {
    /// Bus substrate: "nats" (fan-out), "kafka" (partitioned log), or
    /// "memory" (single-process).
    #[arg(long, default_value = "nats", env = "SKEIN_BUS")]
    pub bus: String,

    /// NATS server URL for the fan-out substrate.
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "SKEIN_NATS_URL")]
    pub nats_url: String,

    /// NATS auth token.
    #[arg(long, env = "SKEIN_NATS_TOKEN")]
    pub nats_token: Option<String>,
}

impl BusConfig {
    /// Connect the configured substrate.
    pub async fn connect(&self, kafka: &KafkaConfig) -> anyhow::Result<EventBus> {
        match self.bus.as_str() {
            "nats" => Ok(EventBus::Fanout(
                FanoutBus::connect(&self.nats_url, self.nats_token.as_deref()).await?,
            )),
            "kafka" => Ok(EventBus::Log(LogBus::new(&kafka.kafka_brokers, &kafka.kafka_group_id)?)),
            "memory" => Ok(EventBus::Memory(MemoryBus::new())),
            other => anyhow::bail!("unknown bus substrate: {other}"),
        }
    }
}

/// gRPC client/server options for the chat delivery plane.
#[derive(Debug, Clone, clap::Args)]
pub struct GrpcConfig {
    /// Dial timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "SKEIN_GRPC_DIAL_TIMEOUT_MS")]
    pub grpc_dial_timeout_ms: u64,

    /// Per-call timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "SKEIN_GRPC_CALL_TIMEOUT_MS")]
    pub grpc_call_timeout_ms: u64,

    /// Idle timeout before a pooled channel is dropped, in seconds.
    #[arg(long, default_value_t = 60, env = "SKEIN_GRPC_IDLE_TIMEOUT_SECS")]
    pub grpc_idle_timeout_secs: u64,
}

impl GrpcConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.grpc_dial_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.grpc_call_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.grpc_idle_timeout_secs)
    }
}

/// WebSocket keepalive options.
#[derive(Debug, Clone, clap::Args)]
pub struct WsConfig {
    /// Server ping interval in seconds.
    #[arg(long, default_value_t = 30, env = "SKEIN_WS_PING_INTERVAL_SECS")]
    pub ws_ping_interval_secs: u64,

    /// Close a connection that has not ponged within this many seconds.
    #[arg(long, default_value_t = 60, env = "SKEIN_WS_PONG_WAIT_SECS")]
    pub ws_pong_wait_secs: u64,

    /// Per-frame write timeout in seconds.
    #[arg(long, default_value_t = 10, env = "SKEIN_WS_WRITE_WAIT_SECS")]
    pub ws_write_wait_secs: u64,
}

impl WsConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.ws_pong_wait_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.ws_write_wait_secs)
    }
}

/// Logging options.
#[derive(Debug, Clone, clap::Args)]
pub struct LogConfig {
    /// Log level filter (overridden by RUST_LOG).
    #[arg(long, default_value = "info", env = "SKEIN_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format: "text" or "json".
    #[arg(long, default_value = "text", env = "SKEIN_LOG_FORMAT")]
    pub log_format: String,
}

/// Initialize tracing for a service binary.
pub fn init_tracing(config: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
