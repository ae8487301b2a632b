// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the armada-remote server binary.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Spawns a server process and kills it on drop.
struct ServerProcess {
    child: Child,
    port: u16,
}

impl ServerProcess {
    fn spawn(seed: Option<&Path>, offset: u16) -> Self {
        // High ephemeral range, spread per process to avoid collisions.
        let port = 49152 + (std::process::id() % 1000) as u16 * 2 + offset;

        let mut command = Command::new(env!("CARGO_BIN_EXE_armada-remote"));
        command
            .arg("--bind")
            .arg(format!("127.0.0.1:{}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(seed) = seed {
            command.arg("--seed").arg(seed);
        }
        let child = command.spawn().expect("spawn server process");

        ServerProcess { child, port }
    }

    fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    async fn connect(&self) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
        // CI runners can be slow to start the binary.
        for _ in 0..20 {
            if let Ok(Ok((stream, _))) =
                tokio::time::timeout(Duration::from_millis(500), connect_async(&self.ws_url()))
                    .await
            {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        panic!("should connect to server within retries");
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn next_json(stream: &mut SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>) -> Value {
    match tokio::time::timeout(Duration::from_secs(5), stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected a text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_lifecycle() {
    let server = ServerProcess::spawn(None, 0);
    let (mut sink, mut stream) = server.connect().await.split();

    assert_eq!(next_json(&mut stream).await["type"], "connected");
    let snapshot = next_json(&mut stream).await;
    assert_eq!(snapshot["type"], "epics.snapshot");
    assert_eq!(snapshot["payload"]["epics"], serde_json::json!([]));

    let ping = serde_json::json!({ "type": "ping", "payload": {} });
    sink.send(Message::Text(ping.to_string().into()))
        .await
        .expect("send ping");
    assert_eq!(next_json(&mut stream).await["type"], "pong");
}

#[tokio::test]
async fn test_seeded_server_serves_and_moves_epics() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let seed = dir.path().join("seed.json");
    std::fs::write(
        &seed,
        r#"[{"id":"GA-33","summary":"Login flow","currentState":"planning_review","currentStep":3}]"#,
    )
    .unwrap();

    let server = ServerProcess::spawn(Some(&seed), 1);
    let (mut sink, mut stream) = server.connect().await.split();

    assert_eq!(next_json(&mut stream).await["type"], "connected");
    let snapshot = next_json(&mut stream).await;
    assert_eq!(snapshot["payload"]["epics"][0]["id"], "GA-33");
    assert_eq!(
        snapshot["payload"]["epics"][0]["currentState"],
        "planning_review"
    );

    let action = serde_json::json!({
        "type": "epic.action",
        "payload": { "epicId": "GA-33", "action": "approve_plan" }
    });
    sink.send(Message::Text(action.to_string().into()))
        .await
        .expect("send action");

    let update = next_json(&mut stream).await;
    assert_eq!(update["type"], "epics.snapshot");
    assert_eq!(update["payload"]["epics"][0]["currentState"], "executing");
}
