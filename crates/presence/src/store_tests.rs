// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Identity, LiveStatus, PresenceStore};

fn auth(user: &str) -> Identity {
    Identity::Auth { user_id: user.to_owned() }
}

fn anon(hash: &str) -> Identity {
    Identity::Anon { device_hash: hash.to_owned() }
}

#[test]
fn identity_key_layout() {
    let user = auth("u1");
    assert_eq!(user.room_set("r1"), "presence:room:r1:users");
    assert_eq!(user.reverse_key(), "presence:user:u1");

    let device = anon("d1");
    assert_eq!(device.room_set("r1"), "presence:room:r1:devices");
    assert_eq!(device.reverse_key(), "presence:device:d1");
}

#[tokio::test]
async fn count_sums_auth_and_anon_entries() -> anyhow::Result<()> {
    let store = PresenceStore::memory();
    assert_eq!(store.join("r1", &auth("u1")).await?, 1);
    assert_eq!(store.join("r1", &auth("u2")).await?, 2);
    assert_eq!(store.join("r1", &anon("d1")).await?, 3);

    // Re-joining the same identity does not double count.
    assert_eq!(store.join("r1", &auth("u1")).await?, 3);

    assert_eq!(store.leave("r1", &auth("u2")).await?, 2);
    assert_eq!(store.count("r1").await?, 2);
    assert_eq!(store.count("other").await?, 0);
    Ok(())
}

#[tokio::test]
async fn live_status_round_trip() -> anyhow::Result<()> {
    let store = PresenceStore::memory();
    assert!(store.live_status("r1").await?.is_none());
    assert!(store.live_rooms().await?.is_empty());

    let status = LiveStatus { is_live: true, broadcaster_id: "u1".into(), started_at: 123 };
    store.set_live("r1", &status).await?;
    assert_eq!(store.live_status("r1").await?, Some(status));
    assert_eq!(store.live_rooms().await?, vec!["r1".to_owned()]);

    store.set_offline("r1").await?;
    assert!(store.live_status("r1").await?.is_none());
    assert!(store.live_rooms().await?.is_empty());
    Ok(())
}
