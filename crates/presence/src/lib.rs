// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skein presence: WebSocket presence tracking over TTL'd store entries plus
//! authoritative live-status reconciliation with a disconnect grace period.

pub mod config;
pub mod fanout;
pub mod live;
pub mod state;
pub mod store;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::PresenceConfig;
use crate::live::LiveTracker;
use crate::state::PresenceState;
use crate::store::PresenceStore;

/// Run the presence service until shutdown.
pub async fn run(config: PresenceConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = skein_core::shutdown::install();

    let bus = config.bus.connect(&config.kafka).await?;
    let store = match config.store_type.as_str() {
        "redis" => {
            PresenceStore::connect_redis(&config.redis.redis_url, config.heartbeat_timeout())
                .await?
        }
        "memory" => PresenceStore::memory(),
        other => anyhow::bail!("unknown presence store: {other}"),
    };

    let state = Arc::new(PresenceState::new(config, bus, store, shutdown.clone()));
    LiveTracker::new(Arc::clone(&state)).spawn();
    fanout::spawn(Arc::clone(&state));

    let router = Router::new()
        .route("/presence/ws", get(ws::ws_handler))
        .route("/live-rooms", get(live_rooms))
        .route("/health", get(|| async { "OK" }))
        .route("/healthz", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    info!("skein-presence listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.bus.close();
    Ok(())
}

/// `GET /live-rooms` — rooms currently live, per the authoritative store.
async fn live_rooms(State(state): State<Arc<PresenceState>>) -> Json<Vec<String>> {
    match state.store.live_rooms().await {
        Ok(rooms) => Json(rooms),
        Err(e) => {
            warn!(err = %e, "live rooms read failed");
            Json(Vec::new())
        }
    }
}
