// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection manager.
//!
//! Owns at most one logical connection to the control plane, republishes
//! inbound envelopes on an [`EventBus`] keyed by envelope type, and
//! reconnects with exponential backoff after an unexpected close or error.
//!
//! Every connection attempt runs in its own task and is tagged with an
//! epoch. `connect()` and `disconnect()` bump the epoch under the state lock,
//! so callbacks from a superseded attempt find a stale epoch and do nothing.
//! The reconnect timer is a task guarded by a [`CancellationToken`].
//!
//! All methods that start work (`connect`, and reconnects) must be called
//! from within a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard};

use armada_core::protocol::event;
use armada_core::Envelope;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::bus::{Bus, EventBus, Subscription};
use super::simulation::Simulator;
use super::status::ConnectionStatus;
use super::transport::{websocket_factory, Transport, TransportFactory};
use crate::config::{Config, ConnectionConfig, Mode, SimulationConfig};

const STATUS_CHANNEL: &str = "status";
const EXHAUSTED_CHANNEL: &str = "exhausted";

enum Backend {
    Network(TransportFactory),
    Simulation(SimulationConfig),
}

/// The live connection attempt or established connection.
struct Session {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct State {
    status: ConnectionStatus,
    /// Generation of the current session; bumped by connect, reconnect and disconnect.
    epoch: u64,
    /// Reconnect attempts since the last successful connect.
    attempts: u32,
    exhausted: bool,
    reconnect: Option<CancellationToken>,
    session: Option<Session>,
}

struct Inner {
    config: ConnectionConfig,
    backoff: Backoff,
    backend: Backend,
    events: EventBus,
    statuses: Bus<ConnectionStatus>,
    exhaustion: Bus<u32>,
    state: Mutex<State>,
}

/// Handle to the connection. Clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager for the mode selected in `config`.
    pub fn new(config: &Config) -> Self {
        match config.connection.mode {
            Mode::WebSocket => Self::with_transport(config.connection.clone(), websocket_factory()),
            Mode::Simulation => {
                Self::simulated(config.connection.clone(), config.simulation.clone())
            }
        }
    }

    /// Creates a network manager using `factory` for each connection attempt.
    pub fn with_transport(config: ConnectionConfig, factory: TransportFactory) -> Self {
        Self::build(config, Backend::Network(factory))
    }

    /// Creates a manager that never touches the network.
    pub fn simulated(config: ConnectionConfig, simulation: SimulationConfig) -> Self {
        Self::build(config, Backend::Simulation(simulation))
    }

    fn build(config: ConnectionConfig, backend: Backend) -> Self {
        ConnectionManager {
            inner: Arc::new(Inner {
                backoff: config.backoff(),
                config,
                backend,
                events: EventBus::new(),
                statuses: Bus::new(),
                exhaustion: Bus::new(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.inner.backend, Backend::Simulation(_))
    }

    /// True once reconnecting has been abandoned. Cleared by `connect()`.
    pub fn retries_exhausted(&self) -> bool {
        self.inner.lock().exhausted
    }

    /// Reconnect attempts made since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Starts connecting. A no-op while connecting or connected.
    ///
    /// Supersedes a pending reconnect timer and resets the attempt counter.
    pub fn connect(&self) {
        let started = {
            let mut state = self.inner.lock();
            if state.status.is_active() {
                debug!(status = %state.status, "connect ignored");
                return;
            }
            if let Some(timer) = state.reconnect.take() {
                timer.cancel();
            }
            state.attempts = 0;
            state.exhausted = false;
            Inner::begin(&mut state)
        };
        self.inner.notify(ConnectionStatus::Connecting);
        Inner::launch(&self.inner, started);
    }

    /// Tears down the connection and cancels any pending reconnect.
    ///
    /// Safe to call repeatedly. Notifies listeners only if the status changed.
    pub fn disconnect(&self) {
        let changed = {
            let mut state = self.inner.lock();
            state.epoch += 1;
            if let Some(timer) = state.reconnect.take() {
                timer.cancel();
            }
            if let Some(session) = state.session.take() {
                session.cancel.cancel();
            }
            state.attempts = 0;
            state.exhausted = false;
            let changed = state.status != ConnectionStatus::Disconnected;
            state.status = ConnectionStatus::Disconnected;
            changed
        };
        if changed {
            info!("disconnected");
            self.inner.notify(ConnectionStatus::Disconnected);
        }
    }

    /// Registers a handler for inbound envelopes of type `event`.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(event, handler)
    }

    /// Registers a handler for status transitions.
    pub fn on_status_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.statuses.subscribe(STATUS_CHANNEL, handler)
    }

    /// Registers a handler called with the attempt count when automatic
    /// reconnecting gives up.
    pub fn on_retries_exhausted<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&u32) + Send + Sync + 'static,
    {
        self.inner.exhaustion.subscribe(EXHAUSTED_CHANNEL, handler)
    }

    /// Sends `{type, payload}` to the control plane. See [`send_envelope`](Self::send_envelope).
    pub fn send(&self, kind: &str, payload: Value) -> bool {
        self.send_envelope(Envelope::new(kind, payload))
    }

    /// Fire-and-forget send.
    ///
    /// Dropped with a warning unless connected; nothing is queued. Returns
    /// whether the message was handed to the transport.
    pub fn send_envelope(&self, envelope: Envelope) -> bool {
        let state = self.inner.lock();
        if state.status != ConnectionStatus::Connected {
            warn!(event = %envelope.kind, status = %state.status, "not connected, dropping outbound message");
            return false;
        }
        if let Backend::Simulation(_) = self.inner.backend {
            debug!(event = %envelope.kind, payload = %envelope.payload, "simulation: outbound message");
            return true;
        }
        let Some(session) = state.session.as_ref() else {
            warn!(event = %envelope.kind, "no active session, dropping outbound message");
            return false;
        };
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(event = %envelope.kind, error = %e, "failed to encode outbound message");
                return false;
            }
        };
        debug!(event = %envelope.kind, "outbound");
        session.outbound.send(text).is_ok()
    }
}

/// What a freshly begun attempt needs to run.
struct Started {
    epoch: u64,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    fn notify(&self, status: ConnectionStatus) {
        self.statuses.publish(STATUS_CHANNEL, &status);
    }

    /// Opens a new session generation and moves to `connecting`.
    fn begin(state: &mut State) -> Started {
        state.epoch += 1;
        state.status = ConnectionStatus::Connecting;
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state.session = Some(Session {
            cancel: cancel.clone(),
            outbound: tx,
        });
        Started {
            epoch: state.epoch,
            cancel,
            outbound: rx,
        }
    }

    fn launch(this: &Arc<Self>, started: Started) {
        match &this.backend {
            Backend::Network(factory) => {
                let transport = factory();
                tokio::spawn(run_network(Arc::clone(this), started, transport));
            }
            Backend::Simulation(simulation) => {
                if this.mark_connected(started.epoch) {
                    tokio::spawn(run_simulation(
                        Arc::clone(this),
                        started.epoch,
                        started.cancel,
                        simulation.clone(),
                    ));
                }
            }
        }
    }

    fn mark_connected(&self, epoch: u64) -> bool {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                return false;
            }
            state.status = ConnectionStatus::Connected;
            state.attempts = 0;
            state.exhausted = false;
        }
        match self.backend {
            Backend::Network(_) => info!(url = %self.config.url, "connected"),
            Backend::Simulation(_) => info!("connected (simulation)"),
        }
        self.notify(ConnectionStatus::Connected);
        true
    }

    /// Records the end of session `epoch` and feeds the reconnect policy.
    fn connection_lost(this: &Arc<Self>, epoch: u64, status: ConnectionStatus) {
        {
            let mut state = this.lock();
            if state.epoch != epoch {
                return;
            }
            state.session = None;
            state.status = status;
        }
        this.notify(status);
        Self::schedule_reconnect(this, epoch);
    }

    fn schedule_reconnect(this: &Arc<Self>, epoch: u64) {
        let (delay, attempt, token) = {
            let mut state = this.lock();
            // A status listener may already have called connect() or disconnect().
            if state.epoch != epoch || state.reconnect.is_some() {
                return;
            }
            if state.attempts >= this.backoff.max_attempts {
                state.exhausted = true;
                let attempts = state.attempts;
                drop(state);
                error!(
                    attempts,
                    url = %this.config.url,
                    "giving up on reconnecting; connect again to retry"
                );
                this.exhaustion.publish(EXHAUSTED_CHANNEL, &attempts);
                return;
            }
            let delay = this.backoff.delay(state.attempts);
            state.attempts += 1;
            let token = CancellationToken::new();
            state.reconnect = Some(token.clone());
            (delay, state.attempts, token)
        };

        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => Inner::reconnect_due(&inner, epoch, &token),
            }
        });
    }

    fn reconnect_due(this: &Arc<Self>, epoch: u64, token: &CancellationToken) {
        let started = {
            let mut state = this.lock();
            if state.epoch != epoch || token.is_cancelled() {
                return;
            }
            state.reconnect = None;
            Self::begin(&mut state)
        };
        this.notify(ConnectionStatus::Connecting);
        Self::launch(this, started);
    }

    fn deliver_text(&self, epoch: u64, text: &str) {
        match Envelope::from_json(text) {
            Ok(envelope) => self.deliver(epoch, &envelope),
            Err(e) => warn!(error = %e, "dropping malformed message"),
        }
    }

    fn deliver(&self, epoch: u64, envelope: &Envelope) {
        if !self.is_current(epoch) {
            return;
        }
        debug!(event = %envelope.kind, "inbound");
        if self.events.publish(&envelope.kind, &envelope.payload) == 0
            && envelope.kind != event::PONG
        {
            debug!(event = %envelope.kind, "no subscribers");
        }
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_network(inner: Arc<Inner>, started: Started, mut transport: Box<dyn Transport>) {
    let Started {
        epoch,
        cancel,
        mut outbound,
    } = started;
    let url = inner.config.url.clone();

    debug!(%url, epoch, "connecting");
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = transport.connect(&url) => result,
    };
    if let Err(e) = connected {
        warn!(%url, error = %e, "connection attempt failed");
        Inner::connection_lost(&inner, epoch, ConnectionStatus::Error);
        return;
    }
    if !inner.mark_connected(epoch) {
        let _ = transport.disconnect().await;
        return;
    }

    let mut heartbeat = inner
        .config
        .heartbeat_interval()
        .map(|period| interval_at(Instant::now() + period, period));
    let timeout = inner.config.heartbeat_timeout();
    let mut last_seen = Instant::now();

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = transport.disconnect().await;
                return;
            }
            frame = transport.recv() => match frame {
                Ok(Some(text)) => {
                    last_seen = Instant::now();
                    inner.deliver_text(epoch, &text);
                }
                Ok(None) => {
                    info!(%url, "connection closed by server");
                    break ConnectionStatus::Disconnected;
                }
                Err(e) => {
                    warn!(%url, error = %e, "connection error");
                    break ConnectionStatus::Error;
                }
            },
            Some(text) = outbound.recv() => {
                if let Err(e) = transport.send(text).await {
                    warn!(error = %e, "send failed");
                    break ConnectionStatus::Error;
                }
            }
            _ = tick(&mut heartbeat) => {
                if last_seen.elapsed() >= timeout {
                    warn!(silent_ms = last_seen.elapsed().as_millis() as u64, "heartbeat timed out");
                    break ConnectionStatus::Error;
                }
                let ping = match Envelope::ping().to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode ping");
                        continue;
                    }
                };
                if let Err(e) = transport.send(ping).await {
                    warn!(error = %e, "heartbeat send failed");
                    break ConnectionStatus::Error;
                }
            }
        }
    };

    let _ = transport.disconnect().await;
    Inner::connection_lost(&inner, epoch, outcome);
}

async fn run_simulation(
    inner: Arc<Inner>,
    epoch: u64,
    cancel: CancellationToken,
    config: SimulationConfig,
) {
    let mut simulator = Simulator::new(config.clone(), Utc::now());
    for envelope in simulator.opening() {
        inner.deliver(epoch, &envelope);
    }

    let period = config.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                for envelope in simulator.tick(Utc::now()) {
                    inner.deliver(epoch, &envelope);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
