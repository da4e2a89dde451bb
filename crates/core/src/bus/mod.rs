// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform publish/subscribe over three substrates.
//!
//! - [`fanout`] — NATS core subjects: best-effort, at-most-once per
//!   subscriber, no replay.
//! - [`log`] — Kafka topics keyed by room: durable, at-least-once, per-room
//!   ordering; exact-channel subscriptions get a private consumer group and
//!   filter by key client-side.
//! - [`memory`] — in-process broadcast channels for single-node deployments
//!   and deterministic tests; fan-out semantics.
//!
//! Every subscription is delivered through a bounded buffer with drop-newest
//! overflow, so a stuck subscriber can never apply back-pressure to the
//! producing side. Dropping a [`Subscription`] unsubscribes.

pub mod fanout;
pub mod log;
pub mod memory;

use std::fmt;

use tokio::sync::mpsc;

use crate::event::Event;

pub use fanout::FanoutBus;
pub use log::LogBus;
pub use memory::MemoryBus;

/// Per-subscription delivery buffer. Overflow drops the newest message.
pub(crate) const SUBSCRIBER_BUFFER: usize = 256;

/// Errors surfaced by the bus API.
#[derive(Debug)]
pub enum BusError {
    /// The channel does not match `{producer}:room:{roomID}:to_{target}`.
    BadChannel(String),
    /// The underlying substrate rejected the operation.
    Unavailable(String),
    /// The bus has been closed.
    Closed,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadChannel(channel) => write!(f, "bad channel: {channel}"),
            Self::Unavailable(detail) => write!(f, "bus unavailable: {detail}"),
            Self::Closed => f.write_str("bus closed"),
        }
    }
}

impl std::error::Error for BusError {}

/// A lazy sequence of events, finite once the bus closes or the subscription
/// is dropped.
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub(crate) fn new(channel: String, rx: mpsc::Receiver<Event>) -> Self {
        Self { channel, rx }
    }

    /// The channel or pattern this subscription is bound to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next event; `None` once the stream is finished.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Deliver into a subscription buffer, dropping the newest event on overflow.
pub(crate) fn deliver(tx: &mpsc::Sender<Event>, channel: &str, event: Event) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            tracing::warn!(
                channel,
                kind = %dropped.kind,
                room_id = %dropped.room_id,
                "subscriber buffer full, dropping event"
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// The event bus, dispatching over the configured substrate.
#[derive(Clone)]
pub enum EventBus {
    Fanout(FanoutBus),
    Log(LogBus),
    Memory(MemoryBus),
}

impl EventBus {
    /// Publish an event to an exact channel. Pattern channels and malformed
    /// channels fail with [`BusError::BadChannel`].
    pub async fn publish(&self, channel: &str, event: &Event) -> Result<(), BusError> {
        match self {
            Self::Fanout(bus) => bus.publish(channel, event).await,
            Self::Log(bus) => bus.publish(channel, event).await,
            Self::Memory(bus) => bus.publish(channel, event).await,
        }
    }

    /// Subscribe to an exact channel; only events for that room are yielded.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        match self {
            Self::Fanout(bus) => bus.subscribe(channel).await,
            Self::Log(bus) => bus.subscribe(channel),
            Self::Memory(bus) => bus.subscribe(channel).await,
        }
    }

    /// Subscribe to a pattern (`{producer}:room:*:to_{target}`); events for
    /// every room of the pair are yielded.
    pub async fn subscribe_pattern(&self, pattern: &str) -> Result<Subscription, BusError> {
        match self {
            Self::Fanout(bus) => bus.subscribe(pattern).await,
            Self::Log(bus) => bus.subscribe(pattern),
            Self::Memory(bus) => bus.subscribe(pattern).await,
        }
    }

    /// Close the bus; live subscriptions finish after draining their buffers.
    pub fn close(&self) {
        match self {
            Self::Fanout(bus) => bus.close(),
            Self::Log(bus) => bus.close(),
            Self::Memory(bus) => bus.close(),
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
