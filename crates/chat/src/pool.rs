// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pooled gRPC channels for hub delivery.
//!
//! Channels dial lazily per advertise address and are evicted after an idle
//! timeout; dial and per-call timeouts come from config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use skein_core::config::GrpcConfig;

use crate::proto::chat_delivery_client::ChatDeliveryClient;

/// How often idle channels are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct PooledChannel {
    client: ChatDeliveryClient<tonic::transport::Channel>,
    last_used: Instant,
}

/// Whether an entry has idled past the timeout.
fn is_idle(last_used: Instant, now: Instant, idle_timeout: Duration) -> bool {
    now.duration_since(last_used) > idle_timeout
}

#[derive(Clone)]
pub struct DeliveryPool {
    config: GrpcConfig,
    channels: Arc<Mutex<HashMap<String, PooledChannel>>>,
}

impl DeliveryPool {
    pub fn new(config: GrpcConfig, shutdown: CancellationToken) -> Self {
        let pool = Self { config, channels: Arc::new(Mutex::new(HashMap::new())) };
        pool.spawn_sweeper(shutdown);
        pool
    }

    /// Reuse or dial the channel for an advertise address.
    pub async fn get(
        &self,
        addr: &str,
    ) -> anyhow::Result<ChatDeliveryClient<tonic::transport::Channel>> {
        let mut channels = self.channels.lock().await;
        if let Some(entry) = channels.get_mut(addr) {
            entry.last_used = Instant::now();
            return Ok(entry.client.clone());
        }

        let endpoint = tonic::transport::Endpoint::from_shared(format!("http://{addr}"))?
            .connect_timeout(self.config.dial_timeout())
            .timeout(self.config.call_timeout());
        let channel = endpoint.connect().await?;
        let client = ChatDeliveryClient::new(channel);
        channels.insert(
            addr.to_owned(),
            PooledChannel { client: client.clone(), last_used: Instant::now() },
        );
        debug!(addr, "delivery channel dialed");
        Ok(client)
    }

    /// Drop a channel after a failed call so the next message re-dials.
    pub async fn discard(&self, addr: &str) {
        self.channels.lock().await.remove(addr);
    }

    fn spawn_sweeper(&self, shutdown: CancellationToken) {
        let channels = Arc::clone(&self.channels);
        let idle_timeout = self.config.idle_timeout();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let now = Instant::now();
                let mut channels = channels.lock().await;
                let before = channels.len();
                channels.retain(|_, entry| !is_idle(entry.last_used, now, idle_timeout));
                let evicted = before - channels.len();
                if evicted > 0 {
                    debug!(evicted, "idle delivery channels dropped");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::is_idle;

    #[test]
    fn idle_detection() {
        let now = Instant::now();
        let timeout = Duration::from_secs(60);
        assert!(!is_idle(now, now, timeout));
        assert!(!is_idle(now, now + Duration::from_secs(60), timeout));
        assert!(is_idle(now, now + Duration::from_secs(61), timeout));
    }
}
