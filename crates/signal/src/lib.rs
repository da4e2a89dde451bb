// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skein signaling coordinator: the WebSocket front-end that negotiates
//! WebRTC between broadcaster clients and media workers over the event bus.

pub mod config;
pub mod media_events;
pub mod state;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::SignalConfig;
use crate::state::SignalState;

/// Run the signaling coordinator until shutdown.
pub async fn run(config: SignalConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = skein_core::shutdown::install();

    let bus = config.bus.connect(&config.kafka).await?;
    let state = Arc::new(SignalState::new(config, bus, shutdown.clone()));

    media_events::spawn(Arc::clone(&state));

    let router = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(|| async { "OK" }))
        .route("/healthz", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    info!("skein-signal listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.bus.close();
    Ok(())
}
