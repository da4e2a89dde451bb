// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live-status reconciliation from the broadcast-lifecycle topic.
//!
//! `broadcast_started` flips a room live and cancels any pending offline
//! timer. An explicit stop flips it offline immediately. A disconnect stop
//! arms a per-room grace timer instead — if the broadcaster returns before it
//! fires, the room never leaves `live_rooms`, so a hiccup does not flap the
//! directory.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use skein_core::event::{self, Event};

use crate::state::PresenceState;
use crate::store::LiveStatus;

pub struct LiveTracker {
    state: Arc<PresenceState>,
    timers: Mutex<HashMap<String, CancellationToken>>,
}

impl LiveTracker {
    pub fn new(state: Arc<PresenceState>) -> Arc<Self> {
        Arc::new(Self { state, timers: Mutex::new(HashMap::new()) })
    }

    /// Spawn the lifecycle consumer.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(err = %e, "lifecycle consumer failed");
            }
        });
    }

    async fn run(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut sub = self
            .state
            .bus
            .subscribe_pattern("broadcast:room:*:to_presence")
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        info!("subscribed to broadcast lifecycle");

        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => break,
                event = sub.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event).await;
                }
            }
        }
        Ok(())
    }

    /// Apply one lifecycle event.
    pub(crate) async fn handle(self: &Arc<Self>, event: Event) {
        let room_id = event.room_id.clone();
        match event.kind.as_str() {
            event::BROADCAST_STARTED => {
                self.cancel_timer(&room_id).await;
                let status = LiveStatus {
                    is_live: true,
                    broadcaster_id: event.payload_str("broadcaster_id").to_owned(),
                    started_at: event.timestamp as i64,
                };
                if let Err(e) = self.state.store.set_live(&room_id, &status).await {
                    warn!(room_id, err = %e, "set_live failed");
                } else {
                    info!(room_id, broadcaster_id = %status.broadcaster_id, "room live");
                }
            }

            event::BROADCAST_STOPPED => match event.payload_str("reason") {
                event::REASON_DISCONNECT => self.arm_grace_timer(room_id).await,
                _ => {
                    self.cancel_timer(&room_id).await;
                    self.mark_offline(&room_id).await;
                }
            },

            other => debug!(room_id, kind = other, "ignoring lifecycle event"),
        }
    }

    /// Start (or reset) the offline grace timer for a room.
    async fn arm_grace_timer(self: &Arc<Self>, room_id: String) {
        let token = CancellationToken::new();
        if let Some(previous) = self.timers.lock().await.insert(room_id.clone(), token.clone()) {
            previous.cancel();
        }
        let grace = self.state.config.grace_period();
        info!(room_id, grace_secs = grace.as_secs(), "broadcaster disconnected, grace timer armed");

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(room_id, "grace timer cancelled");
                    return;
                }
                _ = tracker.state.shutdown.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }
            tracker.timers.lock().await.remove(&room_id);
            info!(room_id, "grace period elapsed, room offline");
            tracker.mark_offline(&room_id).await;
        });
    }

    async fn cancel_timer(&self, room_id: &str) {
        if let Some(token) = self.timers.lock().await.remove(room_id) {
            token.cancel();
        }
    }

    async fn mark_offline(&self, room_id: &str) {
        if let Err(e) = self.state.store.set_offline(room_id).await {
            warn!(room_id, err = %e, "set_offline failed");
        }
    }
}

#[cfg(test)]
#[path = "live_tests.rs"]
pub(crate) mod tests;
