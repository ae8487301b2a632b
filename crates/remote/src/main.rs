// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! armada-remote: reference control plane for armada.
//!
//! Holds the authoritative epic map, validates operator actions and agent
//! reports with the same state machine the clients use, and broadcasts
//! accepted changes to every connected client.

mod server;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// armada-remote: reference control plane
#[derive(Parser, Debug)]
#[command(name = "armada-remote")]
#[command(about = "WebSocket control plane relaying epic workflow events to armada clients")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// JSON file with initial epics (an array, or an epics.snapshot payload)
    #[arg(short, long, value_name = "PATH")]
    seed: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting armada-remote");
    info!("  Bind address: {}", args.bind);

    let seed = match &args.seed {
        Some(path) => {
            let epics = state::load_seed(path)?;
            info!("  Seeded {} epics from {}", epics.len(), path.display());
            epics
        }
        None => Vec::new(),
    };

    let state = state::ServerState::new(seed);
    server::run(args.bind, state).await?;

    Ok(())
}
