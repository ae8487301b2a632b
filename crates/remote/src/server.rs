// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket front of the control plane.
//!
//! Every client gets a `connected` greeting and an `epics.snapshot` on
//! connect, then receives every change accepted from any client.

use std::net::SocketAddr;

use armada_core::protocol::{self, event};
use armada_core::{ActionReport, EpicUpdate, Envelope};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::state::{ServerError, ServerState};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Binds `addr` and serves until the listener fails.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "armada-remote listening");
    serve(listener, state).await
}

/// Accepts connections on `listener` until it fails.
pub(crate) async fn serve(listener: TcpListener, state: ServerState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!(peer = %peer_addr, "connection error: {}", e);
            }
        });
    }
}

/// Greets one client, then pumps its frames and the broadcast until either side ends.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
) -> Result<(), BoxError> {
    let (mut ws_sink, mut ws_stream) = tokio_tungstenite::accept_async(stream).await?.split();
    info!(peer = %peer_addr, "client connected");

    // Subscribe before taking the snapshot so no change falls in between.
    let mut changes = state.subscribe();

    let greeting = [
        Envelope::connected("connected to armada-remote"),
        Envelope::snapshot(state.snapshot().await)?,
    ];
    for envelope in greeting {
        ws_sink.send(Message::Text(envelope.to_json()?.into())).await?;
    }

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for reply in handle_client_message(text.as_str(), &state).await {
                            ws_sink.send(Message::Text(reply.to_json()?.into())).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(peer = %peer_addr, "close frame received");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(peer = %peer_addr, "read failed: {}", e);
                        break;
                    }
                    None => {
                        debug!(peer = %peer_addr, "stream ended");
                        break;
                    }
                }
            }

            change = changes.recv() => {
                match change {
                    Ok(envelope) => {
                        let json = envelope.to_json()?;
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            warn!(peer = %peer_addr, "dropping client, write failed: {}", e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        // Clients refuse non-adjacent jumps, so a gap would
                        // strand them; send the whole map instead.
                        warn!(peer = %peer_addr, skipped = n, "client fell behind the broadcast, resyncing");
                        let resync = Envelope::snapshot(state.snapshot().await)?;
                        ws_sink.send(Message::Text(resync.to_json()?.into())).await?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!(peer = %peer_addr, "client disconnected");
    Ok(())
}

/// Processes one client frame and returns the replies for that client.
///
/// Accepted changes reach every client, this one included, through the
/// broadcast channel rather than as replies.
pub(crate) async fn handle_client_message(text: &str, state: &ServerState) -> Vec<Envelope> {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Undecodable frame: {}", e);
            return vec![Envelope::error(format!("invalid message: {}", e))];
        }
    };
    debug!(event = %envelope.kind, "Received message");

    match envelope.kind.as_str() {
        event::PING => vec![Envelope::pong()],

        event::SUBSCRIBE => {
            debug!(payload = %envelope.payload, "Client subscribed");
            Vec::new()
        }

        event::EPIC_ACTION => {
            let report: ActionReport = match protocol::decode(&envelope.kind, &envelope.payload) {
                Ok(report) => report,
                Err(e) => return vec![Envelope::error(e.to_string())],
            };
            let epic_id = report.epic_id.clone();
            match state.apply_action(report).await {
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!(epic = %epic_id, "Action refused: {}", e);
                    refusal(state, &epic_id, &e).await
                }
            }
        }

        event::EPIC_UPDATED | event::EPIC_PROGRESS => {
            let update: EpicUpdate = match protocol::decode(&envelope.kind, &envelope.payload) {
                Ok(update) => update,
                Err(e) => return vec![Envelope::error(e.to_string())],
            };
            match state.apply_report(&envelope.kind, update).await {
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!(event = %envelope.kind, "Report refused: {}", e);
                    vec![Envelope::error(e.to_string())]
                }
            }
        }

        event::ACTIVITY_NEW => {
            state.relay_activity(envelope.payload);
            Vec::new()
        }

        other => {
            warn!(event = other, "Ignoring unknown message type");
            Vec::new()
        }
    }
}

/// Error reply plus the authoritative record, so the client drops its
/// optimistic change.
async fn refusal(state: &ServerState, epic_id: &str, err: &ServerError) -> Vec<Envelope> {
    let mut replies = vec![Envelope::error(err.to_string())];
    if let Some(record) = state.get(epic_id).await {
        match Envelope::snapshot(vec![record]) {
            Ok(envelope) => replies.push(envelope),
            Err(e) => warn!(epic = %epic_id, "Failed to encode record: {}", e),
        }
    }
    replies
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
