// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kafka-backed partitioned-log substrate.
//!
//! A channel maps to the topic `{producer}-to-{target}` with the room ID as
//! the message key, so all events of one room share a partition and arrive in
//! publish order. Pattern subscriptions consume the whole topic under the
//! configured (shared) group id; exact subscriptions derive a private group
//! id per subscription — they must see the room's events regardless of what
//! the shared group has consumed — and filter by key client-side. Offsets
//! auto-commit periodically, which yields at-least-once delivery downstream.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{ChannelAddr, Event, RoomPart};

use super::{deliver, BusError, Subscription, SUBSCRIBER_BUFFER};

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct LogBus {
    brokers: String,
    group_id: String,
    producer: FutureProducer,
    closed: CancellationToken,
}

impl LogBus {
    pub fn new(brokers: &str, group_id: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        info!(brokers, group_id, "log bus producer created");
        Ok(Self {
            brokers: brokers.to_owned(),
            group_id: group_id.to_owned(),
            producer,
            closed: CancellationToken::new(),
        })
    }

    pub async fn publish(&self, channel: &str, event: &Event) -> Result<(), BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let addr = ChannelAddr::parse(channel)?;
        let Some(key) = addr.key() else {
            return Err(BusError::BadChannel(channel.to_owned()));
        };
        let payload =
            serde_json::to_vec(event).map_err(|e| BusError::Unavailable(e.to_string()))?;
        let topic = addr.topic();
        let record = FutureRecord::to(&topic).key(key).payload(&payload);
        self.producer
            .send(record, PRODUCE_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| BusError::Unavailable(e.to_string()))
    }

    pub fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let addr = ChannelAddr::parse(channel)?;
        let topic = addr.topic();

        // Exact subscriptions must not steal offsets from the shared group.
        let (group_id, filter_room) = match &addr.room {
            RoomPart::Exact(room) => (
                format!("{}-{}-{}-{}", self.group_id, topic, room, uuid::Uuid::new_v4()),
                Some(room.clone()),
            ),
            RoomPart::Any => (self.group_id.clone(), None),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let closed = self.closed.clone();
        let channel_name = channel.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    msg = consumer.recv() => {
                        let msg = match msg {
                            Ok(m) => m,
                            Err(e) => {
                                warn!(channel = %channel_name, err = %e, "log consume error");
                                continue;
                            }
                        };
                        if let Some(ref room) = filter_room {
                            let key = msg.key().unwrap_or_default();
                            if key != room.as_bytes() {
                                continue;
                            }
                        }
                        let Some(payload) = msg.payload() else { continue };
                        let event: Event = match serde_json::from_slice(payload) {
                            Ok(e) => e,
                            Err(e) => {
                                debug!(channel = %channel_name, err = %e, "dropping undecodable event");
                                continue;
                            }
                        };
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
