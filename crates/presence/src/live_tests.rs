// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use skein_core::bus::{EventBus, MemoryBus};
use skein_core::config::{BusConfig, KafkaConfig, LogConfig, RedisConfig, WsConfig};
use skein_core::event::{self, Event};

use crate::config::PresenceConfig;
use crate::state::PresenceState;
use crate::store::PresenceStore;

use super::LiveTracker;

pub(crate) fn test_config() -> PresenceConfig {
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

pub(crate) fn test_state() -> Arc<PresenceState> {
    Arc::new(PresenceState::new(
        test_config(),
        EventBus::Memory(MemoryBus::new()),
        PresenceStore::memory(),
        CancellationToken::new(),
    ))
}

fn started(room: &str, broadcaster: &str) -> Event {
    Event::new(
        event::BROADCAST_STARTED,
        room,
        serde_json::json!({ "broadcaster_id": broadcaster }),
    )
}

fn stopped(room: &str, reason: &str) -> Event {
    Event::new(event::BROADCAST_STOPPED, room, serde_json::json!({ "reason": reason }))
}

#[tokio::test]
async fn started_marks_the_room_live() -> anyhow::Result<()> {
    let state = test_state();
    let tracker = LiveTracker::new(Arc::clone(&state));

    tracker.handle(started("r2", "u1")).await;

    let status = state.store.live_status("r2").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(status.is_live);
    assert_eq!(status.broadcaster_id, "u1");
    assert_eq!(state.store.live_rooms().await?, vec!["r2".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn explicit_stop_is_immediately_offline() -> anyhow::Result<()> {
    let state = test_state();
    let tracker = LiveTracker::new(Arc::clone(&state));

    tracker.handle(started("r2", "u1")).await;
    tracker.handle(stopped("r2", event::REASON_EXPLICIT)).await;

    assert!(state.store.live_rooms().await?.is_empty());
    assert!(state.store.live_status("r2").await?.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disconnect_holds_the_room_through_the_grace_period() -> anyhow::Result<()> {
    let state = test_state();
    let tracker = LiveTracker::new(Arc::clone(&state));

    tracker.handle(started("r2", "u1")).await;
    tracker.handle(stopped("r2", event::REASON_DISCONNECT)).await;

    // Half-way through the grace period the room is still live.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(state.store.live_rooms().await?, vec!["r2".to_owned()]);

    // Past the grace period it is offline.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(state.store.live_rooms().await?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnect_cancels_the_grace_timer() -> anyhow::Result<()> {
    let state = test_state();
    let tracker = LiveTracker::new(Arc::clone(&state));

    tracker.handle(started("r2", "u1")).await;
    tracker.handle(stopped("r2", event::REASON_DISCONNECT)).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    tracker.handle(started("r2", "u1")).await;

    // Well past the original grace deadline, the room is still live.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(state.store.live_rooms().await?, vec!["r2".to_owned()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_disconnects_reset_the_timer() -> anyhow::Result<()> {
    let state = test_state();
    let tracker = LiveTracker::new(Arc::clone(&state));

    tracker.handle(started("r2", "u1")).await;
    tracker.handle(stopped("r2", event::REASON_DISCONNECT)).await;
    tokio::time::sleep(Duration::from_secs(45)).await;

    // A second disconnect re-arms the full grace window.
    tracker.handle(stopped("r2", event::REASON_DISCONNECT)).await;
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(state.store.live_rooms().await?, vec!["r2".to_owned()]);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(state.store.live_rooms().await?.is_empty());
    Ok(())
}
