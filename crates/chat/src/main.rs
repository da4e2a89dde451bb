// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use skein_chat::config::{DispatcherConfig, HubConfig, PersistConfig};

#[derive(Parser)]
#[command(name = "skein-chat", version, about = "Skein chat plane services.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// WebSocket chat hub with the delivery RPC.
    Hub(HubConfig),
    /// Log→hub delivery dispatcher.
    Dispatcher(DispatcherConfig),
    /// Persistence consumer + history reader.
    Persist(PersistConfig),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Hub(config) => {
            skein_core::config::init_tracing(&config.log);
            skein_chat::run_hub(config).await
        }
        Command::Dispatcher(config) => {
            skein_core::config::init_tracing(&config.log);
            skein_chat::run_dispatcher(config).await
        }
        Command::Persist(config) => {
            skein_core::config::init_tracing(&config.log);
            skein_chat::run_persist(config).await
        }
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
