// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery dispatcher: the stateless bridge from the chat log to whichever
//! hub instance owns each `(room, session)` pair.
//!
//! Consumes under the shared dispatch group, resolves the owner through the
//! registry, and calls `Deliver` over a pooled channel. A missing
//! registration means no clients are attached anywhere — the message is
//! dropped at debug level. A failed RPC is also final: the log's periodic
//! offset commit has already counted the message, and chat history is the
//! durable record; delivery is best-effort.

use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skein_core::message::ChatMessage;
use skein_core::registry::{HubRegistry, LookupError};

use crate::config::DispatcherConfig;
use crate::pool::DeliveryPool;
use crate::proto;
use crate::log;

/// Run the dispatcher until shutdown.
pub async fn run(config: DispatcherConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let registry = HubRegistry::connect(
        &config.redis.redis_url,
        &config.registry.registry_prefix,
        // The dispatcher never registers; the advertise address is unused.
        "dispatcher",
        config.registry.ttl(),
        config.registry.heartbeat_interval(),
    )
    .await?;
    let pool = DeliveryPool::new(config.grpc.clone(), shutdown.clone());
    let consumer = log::consumer(&config.kafka, log::GROUP_DISPATCH)?;
    info!("dispatcher consuming chat log");

    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = consumer.recv() => match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(err = %e, "chat log consume error");
                    continue;
                }
            },
        };

        let Some(payload) = msg.payload() else { continue };
        let message: ChatMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                debug!(err = %e, "dropping undecodable chat record");
                continue;
            }
        };

        dispatch_one(&registry, &pool, &message).await;
    }

    Ok(())
}

/// Route one message; every outcome is terminal.
async fn dispatch_one(registry: &HubRegistry, pool: &DeliveryPool, message: &ChatMessage) {
    let addr = match registry.lookup(&message.room_id, &message.session_id).await {
        Ok(addr) => addr,
        Err(LookupError::NotRegistered) => {
            debug!(
                room_id = %message.room_id,
                session_id = %message.session_id,
                "no registration, dropping message"
            );
            return;
        }
        Err(LookupError::Unavailable(detail)) => {
            warn!(room_id = %message.room_id, detail, "registry lookup failed");
            return;
        }
    };

    let mut client = match pool.get(&addr).await {
        Ok(client) => client,
        Err(e) => {
            warn!(addr, err = %e, "hub dial failed");
            return;
        }
    };

    let request = proto::DeliverRequest {
        room_id: message.room_id.clone(),
        session_id: message.session_id.clone(),
        message_json: match serde_json::to_string(message) {
            Ok(json) => json,
            Err(_) => return,
        },
    };

    match client.deliver(request).await {
        Ok(response) => {
            debug!(
                addr,
                room_id = %message.room_id,
                delivered = response.into_inner().delivered,
                "message dispatched"
            );
        }
        Err(status) => {
            warn!(addr, code = %status.code(), "delivery rpc failed");
            pool.discard(&addr).await;
        }
    }
}
