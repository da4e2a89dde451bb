// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::mpsc;

use skein_core::event::{self, Event};

use crate::state::tests::test_state;
use crate::ws_msg::ServerMessage;

use super::handle_media_event;

#[tokio::test]
async fn stream_ready_caches_state_and_fans_out() -> anyhow::Result<()> {
    let state = test_state();
    let (tx, mut rx) = mpsc::channel(4);
    state.join("r1", "viewer", tx).await;

    let event = Event::new(
        event::STREAM_READY,
        "r1",
        serde_json::json!({ "hls_url": "/live/r1/2024-01-01T00-00-00Z/stream.m3u8" }),
    );
    handle_media_event(&state, event).await;

    let media = state.room_state("r1");
    assert!(media.is_live);
    assert_eq!(media.hls_url.as_deref(), Some("/live/r1/2024-01-01T00-00-00Z/stream.m3u8"));

    match rx.try_recv()? {
        ServerMessage::StreamAvailable { room_id, hls_url } => {
            assert_eq!(room_id, "r1");
            assert_eq!(hls_url.as_deref(), Some("/live/r1/2024-01-01T00-00-00Z/stream.m3u8"));
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn stream_ended_clears_tables_and_sends_empty_url() -> anyhow::Result<()> {
    let state = test_state();
    let (tx, mut rx) = mpsc::channel(4);
    state.join("r1", "viewer", tx).await;
    {
        let mut tables = state.tables.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        tables.active_broadcasts.insert("r1".into(), "caster".into());
        tables.broadcaster_users.insert("r1".into(), "u1".into());
        tables.room_states.insert(
            "r1".into(),
            crate::state::RoomMediaState { is_live: true, hls_url: Some("/x".into()) },
        );
    }

    handle_media_event(&state, Event::new(event::STREAM_ENDED, "r1", serde_json::json!({}))).await;

    assert!(state.broadcaster_of("r1").is_none());
    assert!(!state.room_state("r1").is_live);
    match rx.try_recv()? {
        ServerMessage::StreamAvailable { hls_url, .. } => assert!(hls_url.is_none()),
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn answer_goes_only_to_the_broadcaster() -> anyhow::Result<()> {
    let state = test_state();
    let (caster_tx, mut caster_rx) = mpsc::channel(4);
    let (viewer_tx, mut viewer_rx) = mpsc::channel(4);
    state.join("r1", "caster", caster_tx).await;
    state.join("r1", "viewer", viewer_tx).await;
    {
        let mut tables = state.tables.lock().map_err(|_| anyhow::anyhow!("lock poisoned"))?;
        tables.active_broadcasts.insert("r1".into(), "caster".into());
    }

    let event =
        Event::new(event::BROADCAST_ANSWER, "r1", serde_json::json!({ "answer": "v=0..." }));
    handle_media_event(&state, event).await;

    match caster_rx.try_recv()? {
        ServerMessage::BroadcastStarted { answer, .. } => assert_eq!(answer, "v=0..."),
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    assert!(viewer_rx.try_recv().is_err(), "viewers do not receive the SDP answer");
    Ok(())
}

#[tokio::test]
async fn answer_without_broadcaster_is_dropped() {
    let state = test_state();
    let event = Event::new(event::BROADCAST_ANSWER, "r1", serde_json::json!({ "answer": "x" }));
    // Nothing to assert beyond "does not panic / does not deliver".
    handle_media_event(&state, event).await;
}
