// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Real-time link to the control plane.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ ConnectionManager │────►│  Transport  │────►│   Control   │
//! │  (backoff, epoch) │◄────│   (trait)   │◄────│    plane    │
//! └───────────────────┘     └─────────────┘     └─────────────┘
//!        │   └── Simulator (demo mode, no transport)
//!        ▼
//! ┌─────────────┐
//! │  EventBus   │  envelope type → handlers
//! └─────────────┘
//! ```
//!
//! # Features
//!
//! - WebSocket connection with heartbeat
//! - Automatic reconnect with capped exponential backoff
//! - Stale-callback protection via session epochs
//! - Offline simulation mode
//! - Injectable transport trait for testing

mod backoff;
mod bus;
mod manager;
mod simulation;
mod status;
mod transport;

pub use backoff::Backoff;
pub use bus::{Bus, EventBus, Subscription};
pub use manager::ConnectionManager;
pub use simulation::Simulator;
pub use status::ConnectionStatus;
pub use transport::{
    websocket_factory, Transport, TransportError, TransportFactory, TransportResult,
    WebSocketTransport,
};

#[cfg(test)]
pub(crate) mod test_helpers;
