// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end fabric scenarios over the in-process substrate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use skein_core::event::{self, Event};
use skein_core::message::ChatMessage;
use skein_media::storage::{LocalStorage, Storage};
use skein_media::vod::store::{MemoryStore, SessionStore};
use skein_media::vod::VodManager;
use skein_presence::live::LiveTracker;
use skein_presence::store::PresenceStore;
use skein_presence::ws_msg::ServerMessage;

use skein_specs::{eventually, presence_instance, shared_bus};

// ── Signaling ↔ media wire contract ───────────────────────────────────────

/// A broadcaster's offer travels to the worker; the answer and the playback
/// URL travel back on the same room's return channel, in publish order.
#[tokio::test]
async fn happy_path_stream_negotiation() -> anyhow::Result<()> {
    let bus = shared_bus();

    // The worker side: consume signaling events for every room.
    let mut worker_sub = bus
        .subscribe_pattern("signal:room:*:to_media")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    // The signaling side: watch room r1's return channel.
    let mut signal_sub =
        bus.subscribe(&event::to_signal("r1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let start = Event::new(
        event::START_BROADCAST,
        "r1",
        serde_json::json!({ "user_id": "u1", "offer": "v=0..." }),
    );
    bus.publish(&event::to_media("r1"), &start).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let got = tokio::time::timeout(Duration::from_secs(1), worker_sub.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("worker sub ended"))?;
    assert_eq!(got.kind, event::START_BROADCAST);
    assert_eq!(got.payload_str("offer"), "v=0...");

    // The worker answers, then reports the stream ready.
    let answer =
        Event::new(event::BROADCAST_ANSWER, "r1", serde_json::json!({ "answer": "v=0..." }));
    bus.publish(&event::to_signal("r1"), &answer).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let ready = Event::new(
        event::STREAM_READY,
        "r1",
        serde_json::json!({ "hls_url": "/live/r1/2024-01-01T00-00-00Z/stream.m3u8" }),
    );
    bus.publish(&event::to_signal("r1"), &ready).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let first = tokio::time::timeout(Duration::from_secs(1), signal_sub.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("signal sub ended"))?;
    assert_eq!(first.kind, event::BROADCAST_ANSWER);
    let second = tokio::time::timeout(Duration::from_secs(1), signal_sub.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("signal sub ended"))?;
    assert_eq!(second.kind, event::STREAM_READY);
    assert_eq!(second.payload_str("hls_url"), "/live/r1/2024-01-01T00-00-00Z/stream.m3u8");
    Ok(())
}

// ── Broadcaster disconnect grace ──────────────────────────────────────────

/// With a 60 s grace period: the room is still live 30 s after a disconnect
/// stop, gone after 65 s — unless the broadcaster returns first.
#[tokio::test(start_paused = true)]
async fn broadcaster_disconnect_grace() -> anyhow::Result<()> {
    let bus = shared_bus();
    let store = PresenceStore::memory();
    let state = presence_instance(bus.clone(), store.clone());
    LiveTracker::new(Arc::clone(&state)).spawn();

    // Let the tracker's subscription land before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Event::new(
        event::BROADCAST_STARTED,
        "r2",
        serde_json::json!({ "broadcaster_id": "u1" }),
    );
    bus.publish(&event::lifecycle("r2"), &started).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.live_rooms().await.is_ok_and(|rooms| rooms.contains(&"r2".to_owned())) }
    })
    .await?;

    let stopped = Event::new(
        event::BROADCAST_STOPPED,
        "r2",
        serde_json::json!({ "reason": event::REASON_DISCONNECT }),
    );
    bus.publish(&event::lifecycle("r2"), &stopped).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.live_rooms().await?, vec!["r2".to_owned()], "still live at t+30s");

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(store.live_rooms().await?.is_empty(), "offline at t+65s");

    // Reconnect variant: a started event inside the grace window holds the
    // room live past the original deadline.
    bus.publish(&event::lifecycle("r2"), &started).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.live_rooms().await.is_ok_and(|rooms| !rooms.is_empty()) }
    })
    .await?;
    bus.publish(&event::lifecycle("r2"), &stopped).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    bus.publish(&event::lifecycle("r2"), &started).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(store.live_rooms().await?, vec!["r2".to_owned()], "reconnect cancelled the timer");
    Ok(())
}

// ── Presence count convergence ────────────────────────────────────────────

/// Three users across two instances all see `count:3`; after one leaves,
/// every remaining client sees `count:2` — via the same fan-out path.
#[tokio::test]
async fn presence_count_convergence() -> anyhow::Result<()> {
    let bus = shared_bus();
    let store = PresenceStore::memory();
    let p1 = presence_instance(bus.clone(), store.clone());
    let p2 = presence_instance(bus.clone(), store.clone());
    skein_presence::fanout::spawn(Arc::clone(&p1));
    skein_presence::fanout::spawn(Arc::clone(&p2));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two clients on P1, one on P2, all in rZ.
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let (tx_c, mut rx_c) = mpsc::channel(8);
    p1.join("rZ", "a", tx_a).await;
    p1.join("rZ", "b", tx_b).await;
    p2.join("rZ", "c", tx_c).await;

    for user in ["ua", "ub", "uc"] {
        let count = store
            .join("rZ", &skein_presence::store::Identity::Auth { user_id: user.to_owned() })
            .await?;
        let update = Event::new(event::COUNT_UPDATE, "rZ", serde_json::json!({ "count": count }));
        bus.publish(&event::count_channel("rZ"), &update)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    // Every client on both instances converges on 3.
    for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
        let mut latest = 0;
        while let Ok(Some(msg)) =
            tokio::time::timeout(Duration::from_millis(300), rx.recv()).await
        {
            if let ServerMessage::Count { count, .. } = msg {
                latest = count;
            }
        }
        assert_eq!(latest, 3);
    }

    // The client on P2 leaves.
    p2.leave("rZ", "c").await;
    let count = store
        .leave("rZ", &skein_presence::store::Identity::Auth { user_id: "uc".to_owned() })
        .await?;
    let update = Event::new(event::COUNT_UPDATE, "rZ", serde_json::json!({ "count": count }));
    bus.publish(&event::count_channel("rZ"), &update).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    for rx in [&mut rx_a, &mut rx_b] {
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("channel closed"))?;
        match msg {
            ServerMessage::Count { count, .. } => assert_eq!(count, 2),
            other => anyhow::bail!("unexpected frame: {other:?}"),
        }
    }
    Ok(())
}

// ── VOD finalization ──────────────────────────────────────────────────────

/// Three segments, then stop: the stored playlist ends with ENDLIST, carries
/// three EXTINF lines, and the room lists exactly one VOD.
#[tokio::test]
async fn vod_finalization() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let hls = skein_media::config::HlsConfig {
        hls_output_dir: dir.path().join("hls"),
        hls_segment_duration_secs: 4,
        hls_playlist_size: 6,
        hls_delete_segments: false,
    };
    let vod_config = skein_media::config::VodConfig { vod_enabled: true, vod_upload_workers: 2 };
    let storage = Storage::Local(LocalStorage::new(dir.path().join("store"), "http://cdn.test"));
    let manager = VodManager::new(
        hls,
        &vod_config,
        SessionStore::Memory(MemoryStore::default()),
        storage.clone(),
        tokio_util::sync::CancellationToken::new(),
    );

    let session_id = manager.start_room("rX").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let session_dir = dir.path().join("hls").join("room_rX").join(&session_id);

    let durations = ["4.004", "3.970", "2.500"];
    let mut playlist = String::from("#EXTM3U\n");
    for (i, duration) in durations.iter().enumerate() {
        let name = format!("segment_{i:03}.ts");
        tokio::fs::write(session_dir.join(&name), vec![9u8; 188]).await?;
        playlist.push_str(&format!("#EXTINF:{duration},\n{name}\n"));
    }
    tokio::fs::write(session_dir.join("stream.m3u8"), &playlist).await?;

    // Wait for the watcher + upload pool to push all three segments.
    let store_dir = dir.path().join("store/vod/room_rX").join(&session_id);
    eventually(Duration::from_secs(10), || {
        let store_dir = store_dir.clone();
        async move { (0..3).all(|i| store_dir.join(format!("segment_{i:03}.ts")).is_file()) }
    })
    .await?;

    manager.finalize_room("rX").await?.ok_or_else(|| anyhow::anyhow!("no session"))?;

    let final_m3u8 = tokio::fs::read_to_string(store_dir.join("stream.m3u8")).await?;
    assert!(final_m3u8.ends_with("#EXT-X-ENDLIST\n"));
    assert!(final_m3u8.contains("#EXT-X-MEDIA-SEQUENCE:0"));
    assert_eq!(final_m3u8.matches("#EXTINF:").count(), 3);
    for duration in durations {
        assert!(final_m3u8.contains(&format!("#EXTINF:{duration},")), "missing {duration}");
    }

    assert_eq!(manager.list_room_vods("rX").await?, vec![session_id]);
    Ok(())
}

// ── Chat message wire format ──────────────────────────────────────────────

/// The JSON that crosses the log, the RPC, and the client socket is one shape.
#[test]
fn chat_message_wire_round_trip() -> anyhow::Result<()> {
    let msg = ChatMessage::new(7, "u1", "ada", "r3", "s1", "hello");
    let json = serde_json::to_string(&msg)?;
    for field in ["\"type\":\"chat_message\"", "\"message_id\":7", "\"room_id\":\"r3\""] {
        assert!(json.contains(field), "missing {field}");
    }
    let back: ChatMessage = serde_json::from_str(&json)?;
    assert_eq!(back, msg);
    Ok(())
}
