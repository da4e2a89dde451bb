// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat log producer and consumer plumbing.
//!
//! Every message of a room shares the room-keyed partition, so room order is
//! total on the log. Delivery and persistence consume the same topic under
//! distinct group ids — two independent cursors over one record stream.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::info;

use skein_core::config::KafkaConfig;
use skein_core::message::ChatMessage;

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer-group suffix for the delivery dispatcher.
pub const GROUP_DISPATCH: &str = "dispatch";

/// Consumer-group suffix for the persistence writer.
pub const GROUP_PERSIST: &str = "persist";

#[derive(Clone)]
pub struct ChatLogProducer {
    producer: FutureProducer,
    topic: String,
}

impl ChatLogProducer {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        info!(topic = %config.kafka_chat_topic, "chat log producer ready");
        Ok(Self { producer, topic: config.kafka_chat_topic.clone() })
    }

    /// Produce one message, keyed by room so room order is preserved.
    pub async fn produce(&self, msg: &ChatMessage) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg)?;
        let record = FutureRecord::to(&self.topic).key(&msg.room_id).payload(&payload);
        self.producer
            .send(record, PRODUCE_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| anyhow::anyhow!("chat log produce failed: {e}"))
    }
}

/// Build a chat-log consumer under `{group_id}-{role}`.
pub fn consumer(config: &KafkaConfig, role: &str) -> anyhow::Result<StreamConsumer> {
    let group = format!("{}-{role}", config.kafka_group_id);
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_brokers)
        .set("group.id", &group)
        .set("enable.auto.commit", "true")
        .set("auto.commit.interval.ms", "5000")
        .set("auto.offset.reset", "earliest")
        .create()?;
    consumer.subscribe(&[config.kafka_chat_topic.as_str()])?;
    info!(topic = %config.kafka_chat_topic, group, "chat log consumer ready");
    Ok(consumer)
}
