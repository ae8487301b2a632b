// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Holds the authoritative epic map and the broadcast channel that fans
//! accepted changes out to every connected client.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use armada_core::protocol::{event, CREATE_ACTION};
use armada_core::{
    apply, ActionReport, EpicRecord, EpicUpdate, Envelope, Rejection, Snapshot, Transition,
    TransitionRequest,
};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// Why the server refused a client message.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("rejected ({tag}): {0}", tag = .0.tag())]
    Rejected(Rejection),

    #[error("unknown epic: {0}")]
    UnknownEpic(String),

    #[error("epic already exists: {0}")]
    AlreadyExists(String),

    #[error("missing epic id")]
    MissingId,

    #[error(transparent)]
    Core(#[from] armada_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid seed file: {0}")]
    Seed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Broadcasts a client may fall behind by before it is resynced.
const BROADCAST_CAPACITY: usize = 1024;

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// Authoritative epics. Broadcasts happen while this is held so every
    /// client sees changes in the order they were applied.
    epics: Mutex<HashMap<String, EpicRecord>>,
    broadcast_tx: broadcast::Sender<Envelope>,
}

impl ServerState {
    pub fn new(seed: Vec<EpicRecord>) -> Self {
        Self::with_capacity(seed, BROADCAST_CAPACITY)
    }

    /// Like [`new`](Self::new) with `capacity` buffered broadcasts per client.
    pub(crate) fn with_capacity(seed: Vec<EpicRecord>, capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        let epics = seed.into_iter().map(|e| (e.id.clone(), e)).collect();
        ServerState {
            inner: Arc::new(ServerStateInner {
                epics: Mutex::new(epics),
                broadcast_tx,
            }),
        }
    }

    /// All epics, ordered by id.
    pub async fn snapshot(&self) -> Vec<EpicRecord> {
        let epics = self.inner.epics.lock().await;
        let mut all: Vec<EpicRecord> = epics.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn get(&self, id: &str) -> Option<EpicRecord> {
        self.inner.epics.lock().await.get(id).cloned()
    }

    /// Subscribe to broadcast messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.broadcast_tx.subscribe()
    }

    fn broadcast(&self, envelope: Envelope) {
        // No receivers is fine: nobody is connected.
        let _ = self.inner.broadcast_tx.send(envelope);
    }

    /// Applies an operator action.
    ///
    /// The resulting record is broadcast as a one-epic `epics.snapshot`:
    /// operator moves are not single pipeline steps, so clients adopt the
    /// record instead of validating it as a remote event.
    pub async fn apply_action(&self, report: ActionReport) -> Result<EpicRecord> {
        if report.action == CREATE_ACTION {
            return self.create(report).await;
        }

        let mut epics = self.inner.epics.lock().await;
        let record = epics
            .get_mut(&report.epic_id)
            .ok_or_else(|| ServerError::UnknownEpic(report.epic_id.clone()))?;

        let request = TransitionRequest::Local {
            action: report.action.clone(),
            epic_id: report.epic_id.clone(),
            payload: report.payload.clone(),
        };
        let next = match request.transition().map_err(ServerError::Rejected)? {
            Some(transition) => apply(&record.workflow, transition).map_err(ServerError::Rejected)?,
            None => record.workflow.clone(),
        };

        let from = record.state();
        record.set_workflow(next, Utc::now());
        info!(epic = %record.id, action = %report.action, %from, to = %record.state(), "action applied");

        let record = record.clone();
        self.broadcast(Envelope::snapshot(vec![record.clone()])?);
        Ok(record)
    }

    async fn create(&self, report: ActionReport) -> Result<EpicRecord> {
        let draft = report.epic.unwrap_or_default();
        let id = if draft.id.is_empty() {
            report.epic_id.clone()
        } else {
            draft.id.clone()
        };
        if id.is_empty() {
            return Err(ServerError::MissingId);
        }

        let mut epics = self.inner.epics.lock().await;
        if epics.contains_key(&id) {
            return Err(ServerError::AlreadyExists(id));
        }
        let now = Utc::now();
        let mut record = EpicRecord::new(id.clone(), now);
        record.merge_details(&draft, now);
        epics.insert(id.clone(), record.clone());
        info!(epic = %id, "epic created");

        self.broadcast(Envelope::snapshot(vec![record.clone()])?);
        Ok(record)
    }

    /// Applies an agent's `epic.updated` / `epic.progress` report with
    /// remote-event semantics and relays the report as received.
    ///
    /// Unknown epics are created at `open` first, as clients do.
    pub async fn apply_report(&self, kind: &str, update: EpicUpdate) -> Result<EpicRecord> {
        if update.id.is_empty() {
            return Err(ServerError::MissingId);
        }

        let mut epics = self.inner.epics.lock().await;
        let now = Utc::now();
        let record = epics.entry(update.id.clone()).or_insert_with(|| {
            debug!(epic = %update.id, "first report, creating epic");
            EpicRecord::new(update.id.clone(), now)
        });

        if let Some(target) = update.state {
            let next = apply(&record.workflow, Transition::Remote(target))
                .map_err(ServerError::Rejected)?;
            record.set_workflow(next, now);
        }
        record.merge_details(&update, now);
        debug!(epic = %record.id, state = %record.state(), event = kind, "report applied");

        let record = record.clone();
        self.broadcast(Envelope::with(kind, &update)?);
        Ok(record)
    }

    /// Relays an activity entry to every client.
    pub fn relay_activity(&self, payload: serde_json::Value) {
        self.broadcast(Envelope::new(event::ACTIVITY_NEW, payload));
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    List(Vec<EpicRecord>),
    Snapshot(Snapshot),
}

/// Loads initial epics from a JSON file: either an array of epics or an
/// `epics.snapshot` payload.
pub fn load_seed(path: &Path) -> Result<Vec<EpicRecord>> {
    let content = std::fs::read_to_string(path)?;
    let seed: SeedFile = serde_json::from_str(&content)?;
    let epics = match seed {
        SeedFile::List(epics) => epics,
        SeedFile::Snapshot(snapshot) => snapshot.epics,
    };
    Ok(epics
        .into_iter()
        .map(|mut epic| {
            let wf = &mut epic.workflow;
            wf.current_step = wf.current_step.min(wf.total_steps);
            epic
        })
        .collect())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
