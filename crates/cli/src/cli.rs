// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const QUICKSTART_HELP: &str = "\
Get started:
  armada --simulate watch          Watch a simulated pipeline
  armada watch                     Watch the configured control plane
  armada act GA-33 approve_plan    Approve the plan of epic GA-33
  armada config                    Show the effective configuration";

#[derive(Parser)]
#[command(name = "armada")]
#[command(about = "Follow and steer agent workflow epics in real time")]
#[command(
    long_about = "Follow and steer agent workflow epics in real time.\n\n\
    Connects to a control plane over WebSocket (or simulates one), keeps a live\n\
    view of every epic's lifecycle and sends operator actions upstream."
)]
#[command(after_help = QUICKSTART_HELP)]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ./armada.toml, then the user config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run against the built-in simulator instead of a server
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stream connection status, epic changes and activity until interrupted
    Watch,

    /// Send an operator action for an epic
    #[command(
        arg_required_else_help = true,
        after_help = "Actions:\n  \
        approve_plan, revise, request_changes, merge, approve_merge, cancel, retry\n\n\
        Examples:\n  \
        armada act GA-33 approve_plan\n  \
        armada act GA-33 request_changes --payload '{\"comment\":\"add tests\"}'"
    )]
    Act {
        /// Epic id
        epic: String,

        /// Action to perform
        action: String,

        /// Extra JSON passed through to the control plane
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,

        /// Seconds to wait for the connection and for confirmation
        #[arg(long, default_value = "10", value_name = "SECS")]
        timeout: u64,
    },

    /// Print the effective configuration as TOML
    Config,
}
