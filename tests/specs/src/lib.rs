// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness for end-to-end fabric scenarios.
//!
//! Scenarios run the real service components against the in-process bus
//! substrate and in-memory stores, with `tokio::time` paused where a
//! deterministic clock matters. No broker, Redis, or Postgres required.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use skein_core::bus::{EventBus, MemoryBus};
use skein_core::config::{BusConfig, KafkaConfig, LogConfig, RedisConfig, WsConfig};
use skein_presence::config::PresenceConfig;
use skein_presence::state::PresenceState;
use skein_presence::store::PresenceStore;

/// A single in-process bus shared by every party in a scenario.
pub fn shared_bus() -> EventBus {
    EventBus::Memory(MemoryBus::new())
}

/// Presence service config with a 60 s grace period.
pub fn presence_config() -> PresenceConfig {
    PresenceConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_url: "http://127.0.0.1:1".into(),
        max_frame_bytes: 4096,
        store_type: "memory".into(),
        heartbeat_timeout_secs: 60,
        grace_period_secs: 60,
        broadcast_interval_secs: 10,
        redis: RedisConfig { redis_url: "redis://127.0.0.1:6379".into() },
        bus: BusConfig {
            bus: "memory".into(),
            nats_url: "nats://127.0.0.1:4222".into(),
            nats_token: None,
        },
        kafka: KafkaConfig {
            kafka_brokers: "127.0.0.1:9092".into(),
            kafka_group_id: "skein".into(),
            kafka_chat_topic: "chat-messages".into(),
        },
        ws: WsConfig {
            ws_ping_interval_secs: 30,
            ws_pong_wait_secs: 60,
            ws_write_wait_secs: 10,
        },
        log: LogConfig { log_level: "info".into(), log_format: "text".into() },
    }
}

/// A presence instance wired to a shared bus and a shared store.
pub fn presence_instance(bus: EventBus, store: PresenceStore) -> Arc<PresenceState> {
    Arc::new(PresenceState::new(presence_config(), bus, store, CancellationToken::new()))
}

/// Wait until `check` passes or the timeout elapses. Works under paused time.
pub async fn eventually<F, Fut>(timeout: std::time::Duration, mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
