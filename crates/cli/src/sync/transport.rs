// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam between the connection manager and the network.
//!
//! A transport moves raw text frames and nothing else. Envelope decoding
//! lives in the manager, so a malformed frame costs one dropped event
//! rather than the connection. Tests swap in a scripted transport through
//! [`TransportFactory`].

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No open connection.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A bidirectional text-frame channel to the control plane.
///
/// One transport serves one connection attempt; the manager builds a new one
/// through its [`TransportFactory`] for every attempt.
pub trait Transport: Send + Sync {
    /// Opens a connection to `url`.
    fn connect(&mut self, url: &str) -> BoxFuture<'_, TransportResult<()>>;

    /// Closes the connection. Closing an unopened transport is a no-op.
    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>>;

    /// Sends one text frame.
    fn send(&mut self, text: String) -> BoxFuture<'_, TransportResult<()>>;

    /// Waits for the next text frame.
    ///
    /// Returns `None` once the peer closes the connection.
    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<String>>>;

    fn is_connected(&self) -> bool;
}

/// Creates a fresh transport for each connection attempt.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Factory producing [`WebSocketTransport`]s.
pub fn websocket_factory() -> TransportFactory {
    Arc::new(|| -> Box<dyn Transport> { Box::new(WebSocketTransport::new()) })
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] over tokio-tungstenite.
#[derive(Default)]
pub struct WebSocketTransport {
    open: Option<(SplitSink<WsStream, Message>, SplitStream<WsStream>)>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the connection after a failure so `is_connected` reports it.
    fn fail<T>(&mut self, err: TransportError) -> TransportResult<T> {
        self.open = None;
        Err(err)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> BoxFuture<'_, TransportResult<()>> {
        let url = url.to_string();
        async move {
            let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            self.open = Some(ws.split());
            Ok(())
        }
        .boxed()
    }

    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        async move {
            if let Some((mut sink, _)) = self.open.take() {
                // The peer may already be gone.
                if let Err(e) = sink.close().await {
                    debug!("close handshake failed: {}", e);
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn send(&mut self, text: String) -> BoxFuture<'_, TransportResult<()>> {
        async move {
            let Some((sink, _)) = self.open.as_mut() else {
                return Err(TransportError::ConnectionClosed);
            };
            match sink.send(Message::Text(text.into())).await {
                Ok(()) => Ok(()),
                Err(e) => self.fail(TransportError::SendFailed(e.to_string())),
            }
        }
        .boxed()
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<String>>> {
        async move {
            loop {
                let Some((_, stream)) = self.open.as_mut() else {
                    return Err(TransportError::ConnectionClosed);
                };
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "peer closed the connection");
                        self.open = None;
                        return Ok(None);
                    }
                    None => {
                        self.open = None;
                        return Ok(None);
                    }
                    // tungstenite answers pings itself; binary frames carry nothing for us.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return self.fail(TransportError::ReceiveFailed(e.to_string())),
                }
            }
        }
        .boxed()
    }

    fn is_connected(&self) -> bool {
        self.open.is_some()
    }
}
