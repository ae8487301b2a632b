// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use armada_core::EpicState;
use thiserror::Error;

use crate::dispatch::DispatchError;

/// All possible errors surfaced by the armada library and CLI.
///
/// Transport failures never appear here; the connection manager recovers
/// from them and reports status changes instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] armada_core::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("could not connect to {url}: {reason}\n  hint: start armada-remote or pass --simulate")]
    Unreachable { url: String, reason: String },

    #[error("invalid --payload: {0}\n  hint: pass a JSON value, e.g. '{{\"comment\":\"add tests\"}}'")]
    InvalidPayload(String),

    #[error("control plane reverted the action: {epic} is {state}")]
    Reverted { epic: String, state: EpicState },

    #[error("epic not found: {0}\n  hint: the control plane did not report this epic after connecting")]
    EpicNotFound(String),
}

/// A specialized Result type for armada operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
