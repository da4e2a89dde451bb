// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skein chat plane: hub (WebSocket rooms + delivery RPC), dispatcher
//! (log→hub routing), and persistence/history (archive writer + paginated
//! reader).

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod history;
pub mod hub;
pub mod log;
pub mod persist;
pub mod pool;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use skein_core::ids::IdAllocator;
use skein_core::registry::HubRegistry;

use crate::config::{DispatcherConfig, HubConfig, PersistConfig};
use crate::hub::ChatHub;
use crate::log::ChatLogProducer;

/// Generated protobuf types for the `skein.v1` package.
pub mod proto {
    tonic::include_proto!("skein.v1");
}

/// Run the chat hub until shutdown.
pub async fn run_hub(config: HubConfig) -> anyhow::Result<()> {
    let ws_addr = format!("{}:{}", config.host, config.port);
    let grpc_addr: std::net::SocketAddr = format!("{}:{}", config.host, config.grpc_port).parse()?;
    let shutdown = skein_core::shutdown::install();

    let registry = HubRegistry::connect(
        &config.redis.redis_url,
        &config.registry.registry_prefix,
        &config.advertise_address,
        config.registry.ttl(),
        config.registry.heartbeat_interval(),
    )
    .await?;
    registry.start_heartbeat(shutdown.clone());

    let ids = IdAllocator::connect(&config.redis.redis_url, &config.registry.registry_prefix)
        .await?;
    let producer = ChatLogProducer::new(&config.kafka)?;
    let hub = ChatHub::new(config.clone(), registry.clone(), ids, producer, shutdown.clone());

    let grpc = {
        let hub = Arc::clone(&hub);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { hub::rpc::serve(hub, grpc_addr, shutdown).await })
    };

    let router = Router::new()
        .route("/chat/ws", get(hub::ws::ws_handler))
        .route("/health", get(|| async { "OK" }))
        .route("/healthz", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&hub));

    info!("skein-chat hub listening on {ws_addr} (rpc {grpc_addr})");
    let listener = TcpListener::bind(&ws_addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    registry.close().await;
    grpc.await??;
    Ok(())
}

/// Run the delivery dispatcher until shutdown.
pub async fn run_dispatcher(config: DispatcherConfig) -> anyhow::Result<()> {
    let shutdown = skein_core::shutdown::install();
    info!("skein-chat dispatcher starting");
    dispatcher::run(config, shutdown).await
}

/// Run the persistence consumer and history reader until shutdown.
pub async fn run_persist(config: PersistConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = skein_core::shutdown::install();

    let pool = persist::connect(&config).await?;
    let cache = cache::HistoryCache::connect(
        &config.redis.redis_url,
        &config.cache_prefix,
        config.cache_ttl(),
    )
    .await?;

    let consumer = {
        let config = config.clone();
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { persist::run(config, pool, shutdown).await })
    };

    let state = Arc::new(history::HistoryState {
        pool,
        cache,
        default_limit: config.history_default_limit,
        max_limit: config.history_max_limit,
    });
    let router = history::router(state);

    info!("skein-chat history listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    consumer.await??;
    Ok(())
}
