// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Configuration is read from TOML. Lookup order:
//! - the path given with `--config`
//! - `armada.toml` in the current directory
//! - `<config dir>/armada/config.toml` (e.g. `~/.config/armada/config.toml`)
//! - built-in defaults
//!
//! Every field has a default, so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::Backoff;

const LOCAL_CONFIG_FILE: &str = "armada.toml";
const CONFIG_DIR_NAME: &str = "armada";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Which transport the connection manager drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Real WebSocket connection to the control plane.
    #[default]
    WebSocket,
    /// No network; events are synthesized locally.
    Simulation,
}

/// `[connection]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub mode: Mode,
    /// Control plane URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,
    /// First reconnect delay in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Growth factor between reconnect delays (default: 1.5).
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    /// Upper bound on any reconnect delay in milliseconds (default: 30000).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up (default: 10).
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Heartbeat ping interval in milliseconds (default: 30000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Silence after which the connection is considered dead (default: 60000).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_url() -> String {
    "ws://localhost:7890".to_string()
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_multiplier() -> f64 {
    1.5
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    60_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            mode: Mode::default(),
            url: default_url(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// The reconnect policy described by this section.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.reconnect_base_delay_ms),
            multiplier: self.reconnect_multiplier,
            max: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }

    /// Heartbeat period, or `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// `[simulation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Milliseconds between synthesized events (default: 10000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Id of the demo epic the simulation walks through the pipeline.
    #[serde(default = "default_demo_epic")]
    pub demo_epic: String,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_demo_epic() -> String {
    "SIM-1".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            interval_ms: default_interval_ms(),
            demo_epic: default_demo_epic(),
        }
    }
}

impl SimulationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Activity entries kept, newest first (default: 50).
    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
}

fn default_activity_capacity() -> usize {
    50
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            activity_capacity: default_activity_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Resolves and loads the effective configuration.
    ///
    /// An explicit path must exist. Otherwise the first existing default
    /// location wins, falling back to built-in defaults. Returns the path
    /// that was read, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        for candidate in default_locations() {
            if candidate.is_file() {
                let config = Self::load(&candidate)?;
                return Ok((config, Some(candidate)));
            }
        }
        Ok((Config::default(), None))
    }

    /// Checks values that would make the connection manager misbehave.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.mode == Mode::WebSocket
            && !(c.url.starts_with("ws://") || c.url.starts_with("wss://"))
        {
            return Err(Error::Config(format!(
                "invalid url '{}': must start with ws:// or wss://\n  hint: set [connection] mode = \"simulation\" to run without a server",
                c.url
            )));
        }
        if c.reconnect_base_delay_ms == 0 {
            return Err(Error::Config(
                "reconnect_base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if c.reconnect_multiplier.is_nan() || c.reconnect_multiplier <= 1.0 {
            return Err(Error::Config(format!(
                "reconnect_multiplier must be greater than 1.0, got {}",
                c.reconnect_multiplier
            )));
        }
        if c.reconnect_max_delay_ms < c.reconnect_base_delay_ms {
            return Err(Error::Config(format!(
                "reconnect_max_delay_ms ({}) must not be below reconnect_base_delay_ms ({})",
                c.reconnect_max_delay_ms, c.reconnect_base_delay_ms
            )));
        }
        // Silence is only checked on a heartbeat tick, so a shorter timeout
        // would fail a peer that answers every ping.
        if c.heartbeat_interval_ms > 0 && c.heartbeat_timeout_ms <= c.heartbeat_interval_ms {
            return Err(Error::Config(format!(
                "heartbeat_timeout_ms ({}) must be greater than heartbeat_interval_ms ({})\n  hint: set heartbeat_interval_ms = 0 to disable heartbeats",
                c.heartbeat_timeout_ms, c.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    locations
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
