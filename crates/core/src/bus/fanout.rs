// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS-backed fan-out substrate.
//!
//! Channels map onto subjects (`signal:room:r1:to_media` →
//! `signal.room.r1.to_media`); patterns use the `*` wildcard token. Every
//! active subscriber sees every matching message; nothing is replayed.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event::{ChannelAddr, Event};

use super::{deliver, BusError, Subscription, SUBSCRIBER_BUFFER};

#[derive(Clone)]
pub struct FanoutBus {
    client: async_nats::Client,
    closed: CancellationToken,
}

impl FanoutBus {
    /// Connect to the NATS server.
    pub async fn connect(url: &str, token: Option<&str>) -> anyhow::Result<Self> {
        let mut opts = async_nats::ConnectOptions::new();
        if let Some(token) = token {
            opts = opts.token(token.to_owned());
        }
        opts = opts.retry_on_initial_connect();

        let client = opts.connect(url).await?;
        info!(url, "fan-out bus connected");
        Ok(Self { client, closed: CancellationToken::new() })
    }

    pub async fn publish(&self, channel: &str, event: &Event) -> Result<(), BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let addr = ChannelAddr::parse(channel)?;
        if addr.key().is_none() {
            return Err(BusError::BadChannel(channel.to_owned()));
        }
        let payload =
            serde_json::to_vec(event).map_err(|e| BusError::Unavailable(e.to_string()))?;
        self.client
            .publish(addr.subject(), payload.into())
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }

    /// Subscribe to an exact or pattern channel. The same subject mapping
    /// serves both: the `*` room token is a NATS wildcard.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let addr = ChannelAddr::parse(channel)?;
        let mut sub = self
            .client
            .subscribe(addr.subject())
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let closed = self.closed.clone();
        let channel_name = channel.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let event: Event = match serde_json::from_slice(&msg.payload) {
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
            let _ = sub.unsubscribe().await;
        });

        Ok(Subscription::new(channel.to_owned(), rx))
    }

    pub fn close(&self) {
        self.closed.cancel();
    }
}
