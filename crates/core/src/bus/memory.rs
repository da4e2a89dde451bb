// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process substrate: one broadcast channel per topic.
//!
//! Fan-out semantics (every live subscriber sees every matching message, no
//! replay, lagging subscribers drop). Used for single-node deployments and
//! for deterministic tests that should not need a broker.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{ChannelAddr, Event, RoomPart};

use super::{deliver, BusError, Subscription, SUBSCRIBER_BUFFER};

#[derive(Clone, Default)]
pub struct MemoryBus {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
    closed: CancellationToken,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, channel: &str, event: &Event) -> Result<(), BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let addr = ChannelAddr::parse(channel)?;
        if addr.key().is_none() {
            return Err(BusError::BadChannel(channel.to_owned()));
        }
        // No subscriber yet is fine; the message is simply not retained.
        let topics = self.topics.read().await;
        if let Some(tx) = topics.get(&addr.topic()) {
            let _ = tx.send(event.clone());
        }
        Ok(())
    }

    pub async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let addr = ChannelAddr::parse(channel)?;
        let topic = addr.topic();
        let filter_room = match &addr.room {
            RoomPart::Exact(room) => Some(room.clone()),
            RoomPart::Any => None,
        };

        let mut topic_rx = {
            let mut topics = self.topics.write().await;
            topics
                .entry(topic)
                .or_insert_with(|| broadcast::channel(SUBSCRIBER_BUFFER).0)
                .subscribe()
        };

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let closed = self.closed.clone();
        let channel_name = channel.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    event = topic_rx.recv() => {
                        let event = match event {
                            Ok(e) => e,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                debug!(channel = %channel_name, missed = n, "memory subscriber lagged");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if let Some(ref room) = filter_room {
                            if event.room_id != *room {
                                continue;
                            }
                        }
                        if !deliver(&tx, &channel_name, event) {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(channel.to_owned(), rx))
    }

    pub fn close(&self) {
        self.closed.cancel();
    }
}
