// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `armada watch`: stream status, epic and activity changes to stdout.

use serde_json::Value;
use tokio::sync::mpsc;

use super::{format_epic, Session};
use crate::config::{Config, Mode};
use crate::error::Result;
use crate::store::{EpicStore, StoreChange};
use crate::sync::ConnectionStatus;

/// Something worth printing, forwarded from listener callbacks to the loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Update {
    Status(ConnectionStatus),
    Exhausted(u32),
    Changed(StoreChange),
}

pub async fn run(config: &Config) -> Result<()> {
    let session = Session::new(config);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscriptions = {
        let status_tx = tx.clone();
        let exhausted_tx = tx.clone();
        vec![
            session.connection.on_status_change(move |s| {
                let _ = status_tx.send(Update::Status(*s));
            }),
            session.connection.on_retries_exhausted(move |n| {
                let _ = exhausted_tx.send(Update::Exhausted(*n));
            }),
            session.store.subscribe(move |c| {
                let _ = tx.send(Update::Changed(c.clone()));
            }),
        ]
    };

    match config.connection.mode {
        Mode::WebSocket => println!("watching {} (Ctrl-C to stop)", config.connection.url),
        Mode::Simulation => println!("watching simulated control plane (Ctrl-C to stop)"),
    }
    session.connection.connect();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Some(update) = rx.recv() => match update {
                Update::Exhausted(attempts) => {
                    eprintln!();
                    eprintln!("!! gave up reconnecting to {} after {} attempts", config.connection.url, attempts);
                    eprintln!("!! no further automatic retries; restart `armada watch` to try again");
                    eprintln!();
                }
                update => {
                    if let Some(line) = describe(&update, &session.store) {
                        println!("{}", line);
                    }
                }
            },
        }
    }

    session.connection.disconnect();
    for sub in subscriptions {
        sub.unsubscribe();
    }
    Ok(())
}

/// Renders an update as one output line.
pub(crate) fn describe(update: &Update, store: &EpicStore) -> Option<String> {
    match update {
        Update::Status(status) => Some(format!("[status] {}", status)),
        Update::Exhausted(attempts) => Some(format!("[status] gave up after {} attempts", attempts)),
        Update::Changed(StoreChange::Epic(id)) => store
            .get_epic(id)
            .map(|epic| format!("[epic] {}", format_epic(&epic))),
        Update::Changed(StoreChange::Activity) => store
            .recent_activity()
            .first()
            .map(|entry| format!("[activity] {}", format_activity(entry))),
    }
}

/// `agent: message` when the entry has them, the raw JSON otherwise.
pub(crate) fn format_activity(entry: &Value) -> String {
    let message = entry.get("message").and_then(Value::as_str);
    let agent = entry
        .get("agent")
        .or_else(|| entry.get("agentName"))
        .and_then(Value::as_str);
    match (agent, message) {
        (Some(agent), Some(message)) => format!("{}: {}", agent, message),
        (None, Some(message)) => message.to_string(),
        _ => entry.to_string(),
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
