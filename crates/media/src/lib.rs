// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skein media worker: WebRTC ingest, RTP→encoder piping, HLS supervision,
//! VOD recording, and playback routes.

pub mod config;
pub mod hls;
pub mod ingest;
pub mod peer;
pub mod playback;
pub mod preview;
pub mod storage;
pub mod vod;
pub mod worker;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::MediaConfig;
use crate::hls::HlsSupervisor;
use crate::playback::PlaybackState;
use crate::storage::Storage;
use crate::vod::store::SessionStore;
use crate::vod::VodManager;
use crate::worker::MediaWorker;

/// Run the media worker until shutdown.
pub async fn run(config: MediaConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = skein_core::shutdown::install();

    let bus = config.bus.connect(&config.kafka).await?;
    let storage = Storage::from_config(&config.storage).await?;
    let store = SessionStore::from_config(&config.session, &config.redis.redis_url).await?;
    let supervisor = HlsSupervisor::new(config.ffmpeg.clone(), config.hls.clone());
    let vod = VodManager::new(
        config.hls.clone(),
        &config.vod,
        store,
        storage.clone(),
        shutdown.clone(),
    );
    let api = peer::build_api()?;

    let worker = MediaWorker::new(
        config.clone(),
        api,
        bus.clone(),
        supervisor.clone(),
        vod,
        storage.clone(),
        shutdown.clone(),
    );
    let consumer = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    let playback = Arc::new(PlaybackState { hls: config.hls.clone(), storage });
    let router = playback::router(playback);

    info!("skein-media listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    supervisor.stop_all().await;
    bus.close();
    consumer.abort();
    Ok(())
}
