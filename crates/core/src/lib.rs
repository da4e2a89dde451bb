// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skein core: the shared fabric under every skein service.
//!
//! Home of the event bus abstraction (NATS fan-out, Kafka partitioned log,
//! in-process broadcast), the room↔instance registry, the chat message model
//! and ID allocation, thin clients for the external auth and room-directory
//! services, and the config/error/shutdown plumbing the service binaries
//! share.

pub mod bus;
pub mod clients;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod registry;
pub mod shutdown;

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
