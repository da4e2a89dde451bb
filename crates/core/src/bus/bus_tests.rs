// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{BusError, EventBus, MemoryBus};
use crate::event::{self, Event};

fn memory_bus() -> EventBus {
    EventBus::Memory(MemoryBus::new())
}

async fn recv_timeout(sub: &mut super::Subscription) -> anyhow::Result<Event> {
    tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("subscription ended"))
}

#[tokio::test]
async fn exact_subscriber_sees_only_its_room() -> anyhow::Result<()> {
    let bus = memory_bus();
    let mut sub = bus.subscribe(&event::to_media("r1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    bus.publish(&event::to_media("r2"), &Event::new("start_broadcast", "r2", serde_json::json!({})))
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    bus.publish(&event::to_media("r1"), &Event::new("start_broadcast", "r1", serde_json::json!({})))
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let got = recv_timeout(&mut sub).await?;
    assert_eq!(got.room_id, "r1");
    Ok(())
}

#[tokio::test]
async fn pattern_subscriber_sees_every_room() -> anyhow::Result<()> {
    let bus = memory_bus();
    let mut sub =
        bus.subscribe_pattern("signal:room:*:to_media").await.map_err(|e| anyhow::anyhow!("{e}"))?;

    for room in ["r1", "r2", "r3"] {
        bus.publish(&event::to_media(room), &Event::new("ice_candidate", room, serde_json::json!({})))
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    let rooms: Vec<String> = [
        recv_timeout(&mut sub).await?.room_id,
        recv_timeout(&mut sub).await?.room_id,
        recv_timeout(&mut sub).await?.room_id,
    ]
    .into();
    assert_eq!(rooms, ["r1", "r2", "r3"]);
    Ok(())
}

#[tokio::test]
async fn same_room_preserves_publish_order() -> anyhow::Result<()> {
    let bus = memory_bus();
    let mut sub =
        bus.subscribe_pattern("signal:room:*:to_media").await.map_err(|e| anyhow::anyhow!("{e}"))?;

    for i in 0..20 {
        let event = Event::new("ice_candidate", "r1", serde_json::json!({ "seq": i }));
        bus.publish(&event::to_media("r1"), &event).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    for i in 0..20 {
        let got = recv_timeout(&mut sub).await?;
        assert_eq!(got.payload["seq"], i);
    }
    Ok(())
}

#[tokio::test]
async fn publish_to_pattern_is_rejected() {
    let bus = memory_bus();
    let event = Event::new("start_broadcast", "r1", serde_json::json!({}));
    let err = bus.publish("signal:room:*:to_media", &event).await;
    assert!(matches!(err, Err(BusError::BadChannel(_))));
}

#[tokio::test]
async fn malformed_channel_is_rejected_on_subscribe() {
    let bus = memory_bus();
    let err = bus.subscribe("signal/room/r1").await;
    assert!(matches!(err, Err(BusError::BadChannel(_))));
}

#[tokio::test]
async fn close_finishes_subscriptions_and_rejects_publish() -> anyhow::Result<()> {
    let bus = memory_bus();
    let mut sub = bus.subscribe(&event::to_media("r1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    bus.close();
    assert!(matches!(
        bus.publish(&event::to_media("r1"), &Event::new("x", "r1", serde_json::json!({}))).await,
        Err(BusError::Closed)
    ));

    let end = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await?;
    assert!(end.is_none(), "subscription should end after close");
    Ok(())
}

#[tokio::test]
async fn publish_without_subscribers_is_ok() -> anyhow::Result<()> {
    let bus = memory_bus();
    bus.publish(&event::to_signal("r1"), &Event::new("stream_ended", "r1", serde_json::json!({})))
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}
