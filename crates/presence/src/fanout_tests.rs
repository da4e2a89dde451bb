// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::mpsc;

use skein_core::event::{self, Event};

use crate::live::tests::test_state;
use crate::ws_msg::ServerMessage;

use super::apply_update;

#[tokio::test]
async fn update_reaches_every_local_client_of_the_room() -> anyhow::Result<()> {
    let state = test_state();
    let (tx1, mut rx1) = mpsc::channel(4);
    let (tx2, mut rx2) = mpsc::channel(4);
    let (tx3, mut rx3) = mpsc::channel(4);
    state.join("rZ", "c1", tx1).await;
    state.join("rZ", "c2", tx2).await;
    state.join("other", "c3", tx3).await;

    let update = Event::new(event::COUNT_UPDATE, "rZ", serde_json::json!({ "count": 3 }));
    apply_update(&state, &update).await;

    for rx in [&mut rx1, &mut rx2] {
        match rx.try_recv()? {
            ServerMessage::Count { room_id, count } => {
                assert_eq!(room_id, "rZ");
                assert_eq!(count, 3);
            }
            other => anyhow::bail!("unexpected frame: {other:?}"),
        }
    }
    assert!(rx3.try_recv().is_err(), "other rooms hear nothing");
    Ok(())
}

#[tokio::test]
async fn update_for_roomless_instance_is_a_no_op() {
    let state = test_state();
    let update = Event::new(event::COUNT_UPDATE, "rZ", serde_json::json!({ "count": 1 }));
    apply_update(&state, &update).await;
}
