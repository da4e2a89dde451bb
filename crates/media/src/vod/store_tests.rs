// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{session_id_at, MemoryStore, SessionState, SessionStore, VodSession};

fn store() -> SessionStore {
    SessionStore::Memory(MemoryStore::default())
}

fn session(room: &str, id: &str) -> VodSession {
    VodSession::new(room, id, std::path::PathBuf::from(format!("/tmp/{room}/{id}")))
}

#[test]
fn session_id_renders_utc_timestamp() -> anyhow::Result<()> {
    let at = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")?
        .with_timezone(&chrono::Utc);
    assert_eq!(session_id_at(at), "2024-01-01T00-00-00Z");
    Ok(())
}

#[test]
fn transitions_are_monotonic() {
    use SessionState::*;
    assert!(Starting.can_transition_to(Live));
    assert!(Live.can_transition_to(Finalizing));
    assert!(Finalizing.can_transition_to(Completed));
    assert!(!Completed.can_transition_to(Live));
    assert!(!Live.can_transition_to(Starting));
    assert!(Live.can_transition_to(Live));
}

#[tokio::test]
async fn get_returns_none_for_absent_room() -> anyhow::Result<()> {
    assert!(store().get("nope").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn save_is_idempotent() -> anyhow::Result<()> {
    let store = store();
    let s = session("r1", "2024-01-01T00-00-00Z");
    store.save(&s).await?;
    store.save(&s).await?;

    let got = store.get("r1").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(got.session_id, "2024-01-01T00-00-00Z");
    assert_eq!(got.storage_prefix, "vod/room_r1/2024-01-01T00-00-00Z");
    assert_eq!(store.list().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_record() -> anyhow::Result<()> {
    let store = store();
    store.save(&session("r1", "s1")).await?;
    store.delete("r1").await?;
    assert!(store.get("r1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn get_by_state_filters() -> anyhow::Result<()> {
    let store = store();
    let mut live = session("r1", "s1");
    live.state = SessionState::Live;
    let mut finalizing = session("r2", "s2");
    finalizing.state = SessionState::Finalizing;
    store.save(&live).await?;
    store.save(&finalizing).await?;

    let got = store.get_by_state(SessionState::Live).await?;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].room_id, "r1");
    Ok(())
}
