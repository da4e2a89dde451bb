// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-instance count fan-out.
//!
//! Every instance subscribes to the count-update channel and pushes each
//! update to its local clients of that room. Joins and leaves publish their
//! own updates, so the originating instance hears itself — one code path for
//! self and remote visibility. A periodic refresh re-publishes counts for
//! rooms with local clients, converging anything a lost update left stale.

use std::sync::Arc;

use tracing::{debug, error, info};

use skein_core::event::Event;

use crate::state::PresenceState;
use crate::ws_msg::ServerMessage;

/// Spawn the count-update subscriber and the periodic refresher.
pub fn spawn(state: Arc<PresenceState>) {
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = run_subscriber(state).await {
                error!(err = %e, "count fan-out subscriber failed");
            }
        });
    }
    tokio::spawn(run_refresher(state));
}

async fn run_subscriber(state: Arc<PresenceState>) -> anyhow::Result<()> {
    let mut sub = state
        .bus
        .subscribe_pattern("presence:room:*:to_count")
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("subscribed to count updates");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = sub.recv() => {
                let Some(event) = event else { break };
                apply_update(&state, &event).await;
            }
        }
    }
    Ok(())
}

/// Push one count update to the room's local clients.
pub(crate) async fn apply_update(state: &PresenceState, event: &Event) {
    let count = event.payload.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
    let msg = ServerMessage::Count { room_id: event.room_id.clone(), count };
    state.broadcast_room(&event.room_id, &msg).await;
}

/// Periodically re-publish counts for rooms with local clients.
async fn run_refresher(state: Arc<PresenceState>) {
    let mut ticker = tokio::time::interval(state.config.broadcast_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        for room_id in state.local_rooms().await {
            match state.store.count(&room_id).await {
                Ok(count) => crate::ws::publish_count(&state, &room_id, count).await,
                Err(e) => debug!(room_id, err = %e, "count refresh failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
