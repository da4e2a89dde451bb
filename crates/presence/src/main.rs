// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use skein_presence::config::PresenceConfig;

#[tokio::main]
async fn main() {
    let config = PresenceConfig::parse();
    skein_core::config::init_tracing(&config.log);

    if let Err(e) = skein_presence::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
