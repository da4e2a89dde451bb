// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use skein_signal::config::SignalConfig;

#[tokio::main]
async fn main() {
    let config = SignalConfig::parse();
    skein_core::config::init_tracing(&config.log);

    if let Err(e) = skein_signal::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
