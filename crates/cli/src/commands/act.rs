// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `armada act`: dispatch one operator action and wait for the verdict.

use std::time::Duration;

use armada_core::{EpicAction, EpicState};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::Session;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sync::Subscription;

/// How an accepted action ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The control plane reported the optimistic state back.
    Confirmed(EpicState),
    /// Sent, but nothing came back in time.
    Unconfirmed(EpicState),
    /// Simulation mode; there is nobody to confirm.
    Simulated(EpicState),
}

pub async fn run(
    config: &Config,
    epic_id: &str,
    action: &str,
    payload: Option<Value>,
    wait: Duration,
) -> Result<()> {
    action.parse::<EpicAction>()?;
    let session = Session::new(config);
    let outcome = execute(&session, epic_id, action, payload, wait).await?;
    match outcome {
        Outcome::Confirmed(state) => println!("confirmed: {} is {}", epic_id, state),
        Outcome::Unconfirmed(state) => println!(
            "sent: {} is {} locally, no confirmation within {}s",
            epic_id,
            state,
            wait.as_secs()
        ),
        Outcome::Simulated(state) => println!("simulated: {} is {}", epic_id, state),
    }
    Ok(())
}

/// Parses the `--payload` argument.
pub(crate) fn parse_payload(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|text| serde_json::from_str(text).map_err(|e| Error::InvalidPayload(e.to_string())))
        .transpose()
}

/// Connects, dispatches, waits for the verdict and disconnects.
pub(crate) async fn execute(
    session: &Session,
    epic_id: &str,
    action: &str,
    payload: Option<Value>,
    wait: Duration,
) -> Result<Outcome> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let subscriptions = watch_changes(session, tx);

    session.connection.connect();
    let result = dispatch_when_ready(session, &mut rx, epic_id, action, payload, wait).await;

    session.connection.disconnect();
    for sub in subscriptions {
        sub.unsubscribe();
    }
    result
}

/// Wakes `tx` on every status change, exhaustion and store change.
fn watch_changes(session: &Session, tx: mpsc::UnboundedSender<()>) -> Vec<Subscription> {
    let status_tx = tx.clone();
    let exhausted_tx = tx.clone();
    vec![
        session.connection.on_status_change(move |_| {
            let _ = status_tx.send(());
        }),
        session.connection.on_retries_exhausted(move |_| {
            let _ = exhausted_tx.send(());
        }),
        session.store.subscribe(move |_| {
            let _ = tx.send(());
        }),
    ]
}

async fn dispatch_when_ready(
    session: &Session,
    rx: &mut mpsc::UnboundedReceiver<()>,
    epic_id: &str,
    action: &str,
    payload: Option<Value>,
    wait: Duration,
) -> Result<Outcome> {
    let connection = &session.connection;
    let unreachable_err = |reason: String| Error::Unreachable {
        url: connection.url().to_string(),
        reason,
    };

    let ready = timeout(wait, async {
        loop {
            if connection.retries_exhausted() {
                return false;
            }
            if connection.is_connected() && session.store.get_epic(epic_id).is_some() {
                return true;
            }
            if rx.recv().await.is_none() {
                return false;
            }
        }
    })
    .await;
    match ready {
        Ok(true) => {}
        Ok(false) => return Err(unreachable_err("reconnect attempts exhausted".to_string())),
        Err(_) if connection.is_connected() => {
            return Err(Error::EpicNotFound(epic_id.to_string()))
        }
        Err(_) => {
            return Err(unreachable_err(format!(
                "no connection after {}s",
                wait.as_secs()
            )))
        }
    }

    let record = session
        .dispatcher
        .dispatch_action(epic_id, action, payload)?;
    let optimistic = record.state();
    if connection.is_simulated() {
        return Ok(Outcome::Simulated(optimistic));
    }

    let settled = timeout(wait, async {
        while session.dispatcher.is_pending(epic_id) {
            if rx.recv().await.is_none() {
                break;
            }
        }
    })
    .await
    .is_ok();
    if !settled {
        return Ok(Outcome::Unconfirmed(optimistic));
    }

    let state = session
        .store
        .get_epic(epic_id)
        .map(|epic| epic.state())
        .unwrap_or(optimistic);
    if state == optimistic {
        Ok(Outcome::Confirmed(state))
    } else {
        Err(Error::Reverted {
            epic: epic_id.to_string(),
            state,
        })
    }
}

#[cfg(test)]
#[path = "act_tests.rs"]
mod tests;
