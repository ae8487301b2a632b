// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.
//!
//! [`MockRemote`] plays the control plane: it hands out [`MockTransport`]s
//! from a factory, records what they send, and lets a test push frames to,
//! close, or break the latest connection.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use armada_core::Envelope;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use super::status::ConnectionStatus;
use super::transport::{Transport, TransportError, TransportFactory, TransportResult};
use crate::config::ConnectionConfig;

enum Frame {
    Text(String),
    Close,
    Error(String),
}

#[derive(Default)]
struct RemoteState {
    fail_connects: u32,
    connect_delay: Option<Duration>,
    connect_attempts: u32,
    sent: Vec<String>,
    live: Option<mpsc::UnboundedSender<Frame>>,
}

/// Scripted stand-in for the control plane.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> TransportFactory {
        let remote = self.clone();
        Arc::new(move || -> Box<dyn Transport> {
            Box::new(MockTransport {
                remote: remote.clone(),
                rx: None,
            })
        })
    }

    /// Makes the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().unwrap().fail_connects = n;
    }

    /// Makes every connection attempt take `delay` before resolving.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().unwrap().connect_delay = Some(delay);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().unwrap().connect_attempts
    }

    /// Pushes a raw text frame to the live connection.
    pub fn push_text(&self, text: &str) {
        self.push_frame(Frame::Text(text.to_string()));
    }

    pub fn push(&self, envelope: &Envelope) {
        self.push_text(&envelope.to_json().unwrap());
    }

    /// Closes the live connection from the server side.
    pub fn close(&self) {
        self.push_frame(Frame::Close);
    }

    /// Breaks the live connection with a transport error.
    pub fn break_connection(&self) {
        self.push_frame(Frame::Error("connection reset".to_string()));
    }

    /// Frames sent by clients, oldest first.
    pub fn sent(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|text| Envelope::from_json(text).unwrap())
            .collect()
    }

    /// Sent envelopes of one type.
    pub fn sent_of(&self, kind: &str) -> Vec<Envelope> {
        self.sent().into_iter().filter(|e| e.kind == kind).collect()
    }

    fn push_frame(&self, frame: Frame) {
        if let Some(tx) = self.state.lock().unwrap().live.as_ref() {
            let _ = tx.send(frame);
        }
    }
}

pub struct MockTransport {
    remote: MockRemote,
    rx: Option<mpsc::UnboundedReceiver<Frame>>,
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let delay = {
                let mut state = self.remote.state.lock().unwrap();
                state.connect_attempts += 1;
                state.connect_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.remote.state.lock().unwrap();
            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(TransportError::ConnectionFailed("refused".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            state.live = Some(tx);
            self.rx = Some(rx);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.rx = None;
            Ok(())
        })
    }

    fn send(&mut self, text: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.rx.is_none() {
                return Err(TransportError::ConnectionClosed);
            }
            self.remote.state.lock().unwrap().sent.push(text);
            Ok(())
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<String>>> {
        Box::pin(async move {
            let rx = self.rx.as_mut().ok_or(TransportError::ConnectionClosed)?;
            match rx.recv().await {
                Some(Frame::Text(text)) => Ok(Some(text)),
                Some(Frame::Close) | None => {
                    self.rx = None;
                    Ok(None)
                }
                Some(Frame::Error(e)) => {
                    self.rx = None;
                    Err(TransportError::ReceiveFailed(e))
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.rx.is_some()
    }
}

/// Connection settings for tests: heartbeat off, default backoff.
pub fn test_connection_config() -> ConnectionConfig {
    ConnectionConfig {
        heartbeat_interval_ms: 0,
        ..ConnectionConfig::default()
    }
}

/// Records every status transition.
pub fn record_statuses(
    manager: &super::ConnectionManager,
) -> (Arc<Mutex<Vec<ConnectionStatus>>>, super::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let seen = Arc::clone(&seen);
        manager.on_status_change(move |s| seen.lock().unwrap().push(*s))
    };
    (seen, sub)
}

/// Lets spawned tasks run without moving the paused clock meaningfully.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
