// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! armada - real-time sync for agent workflow epics.
//!
//! This crate keeps a local view of a remote control plane's epics and lets
//! an operator act on them.
//!
//! # Main Components
//!
//! - [`ConnectionManager`] - one logical WebSocket connection (or simulator)
//!   with reconnect backoff and an event bus
//! - [`Dispatcher`] - validates remote events and local actions through the
//!   lifecycle state machine and writes the results to the [`EpicStore`]
//! - [`EpicStore`] - observable epic map plus a bounded activity feed
//! - [`Config`] - TOML configuration
//!
//! # Wiring
//!
//! ```rust,ignore
//! use armada::{Config, ConnectionManager, Dispatcher, EpicStore};
//!
//! let (config, _) = Config::discover(None)?;
//! let connection = ConnectionManager::new(&config);
//! let store = EpicStore::new(config.store.activity_capacity);
//! let dispatcher = Dispatcher::new(store.clone(), connection.clone());
//! connection.connect();
//!
//! // Later, from the UI:
//! dispatcher.dispatch_action("GA-33", "approve_plan", None)?;
//! ```

mod cli;
mod commands;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod store;
pub mod sync;

pub use cli::{Cli, Command};
pub use config::{Config, Mode};
pub use dispatch::{DispatchError, Dispatcher};
pub use error::{Error, Result};
pub use store::{EpicStore, StoreChange};
pub use sync::{ConnectionManager, ConnectionStatus, Subscription};

use std::time::Duration;

/// Execute a parsed command line.
///
/// Loads and validates configuration, then runs the command. Network
/// commands get their own tokio runtime.
pub fn run(cli: Cli) -> Result<()> {
    let (mut config, source) = Config::discover(cli.config.as_deref())?;
    if cli.simulate {
        config.connection.mode = Mode::Simulation;
    }
    config.validate()?;

    match cli.command {
        Command::Config => commands::config::run(&config, source.as_deref()),
        Command::Watch => runtime()?.block_on(commands::watch::run(&config)),
        Command::Act {
            epic,
            action,
            payload,
            timeout,
        } => {
            let payload = commands::act::parse_payload(payload.as_deref())?;
            runtime()?.block_on(commands::act::run(
                &config,
                &epic,
                &action,
                payload,
                Duration::from_secs(timeout),
            ))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
