// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization dispatcher.
//!
//! The only writer to the [`EpicStore`]. Remote envelopes arrive through
//! [`ConnectionManager`] subscriptions; local actions arrive through
//! [`Dispatcher::dispatch_action`]. Both run through the state machine
//! before anything is written.
//!
//! Local actions are applied optimistically and reported upstream. Until
//! the control plane reports on that epic again, the last remote-confirmed
//! workflow is kept as the base. A remote state equal to the optimistic one
//! confirms it, a state equal to the base reverts it, and any other state is
//! validated against the base. The remote side always wins.
//!
//! One mutex serializes every handling step, so events and actions for an
//! epic are applied in arrival order. Store listeners run while it is held
//! and must not call back into the dispatcher synchronously.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use armada_core::protocol::{self, event, CREATE_ACTION};
use armada_core::{
    apply, ActionReport, EpicAction, EpicRecord, EpicUpdate, Envelope, Rejection, Snapshot,
    Transition, TransitionRequest, Workflow,
};
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::EpicStore;
use crate::sync::{ConnectionManager, Subscription};

/// Why a local request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("rejected ({tag}): {0}", tag = .0.tag())]
    Rejected(Rejection),

    #[error("unknown epic: {0}")]
    UnknownEpic(String),

    #[error("epic already exists: {0}")]
    AlreadyExists(String),

    #[error("epic id must not be empty")]
    EmptyId,
}

/// An unconfirmed optimistic change.
#[derive(Debug, Clone)]
struct Pending {
    base: Workflow,
    optimistic: Workflow,
}

struct Inner {
    store: EpicStore,
    connection: ConnectionManager,
    pending: Mutex<HashMap<String, Pending>>,
}

/// Routes remote events and local actions into the store.
///
/// Dropping the dispatcher removes its event subscriptions.
pub struct Dispatcher {
    inner: Arc<Inner>,
    subscriptions: Vec<Subscription>,
}

impl Dispatcher {
    /// Creates a dispatcher writing to `store` and subscribes it to the
    /// connection's inbound events.
    pub fn new(store: EpicStore, connection: ConnectionManager) -> Self {
        let inner = Arc::new(Inner {
            store,
            connection,
            pending: Mutex::new(HashMap::new()),
        });

        let mut subscriptions = Vec::new();
        for kind in [event::EPIC_UPDATED, event::EPIC_PROGRESS] {
            let weak = Arc::downgrade(&inner);
            subscriptions.push(inner.connection.subscribe(kind, move |payload| {
                with_inner(&weak, |inner| inner.handle_update(kind, payload));
            }));
        }
        let weak = Arc::downgrade(&inner);
        subscriptions.push(
            inner
                .connection
                .subscribe(event::EPICS_SNAPSHOT, move |payload| {
                    with_inner(&weak, |inner| inner.handle_snapshot(payload));
                }),
        );
        let weak = Arc::downgrade(&inner);
        subscriptions.push(
            inner
                .connection
                .subscribe(event::ACTIVITY_NEW, move |payload| {
                    with_inner(&weak, |inner| inner.store.push_activity(payload.clone()));
                }),
        );

        Dispatcher {
            inner,
            subscriptions,
        }
    }

    pub fn store(&self) -> &EpicStore {
        &self.inner.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Whether `epic_id` has an optimistic change awaiting the control plane.
    pub fn is_pending(&self, epic_id: &str) -> bool {
        self.inner.lock().contains_key(epic_id)
    }

    /// Applies a local action optimistically and reports it upstream.
    ///
    /// On rejection the store is untouched and nothing is sent. Returns the
    /// record as written to the store.
    pub fn dispatch_action(
        &self,
        epic_id: &str,
        action: &str,
        payload: Option<Value>,
    ) -> Result<EpicRecord, DispatchError> {
        self.inner.dispatch(epic_id, action, payload)
    }

    /// Creates a new `open` epic locally and reports it upstream.
    ///
    /// Any state in `draft` is ignored.
    pub fn create_epic(&self, draft: EpicUpdate) -> Result<EpicRecord, DispatchError> {
        self.inner.create(draft)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
    }
}

fn with_inner(weak: &Weak<Inner>, f: impl FnOnce(&Inner)) {
    if let Some(inner) = weak.upgrade() {
        f(&inner);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(
        &self,
        epic_id: &str,
        action: &str,
        payload: Option<Value>,
    ) -> Result<EpicRecord, DispatchError> {
        let request = TransitionRequest::Local {
            action: action.to_string(),
            epic_id: epic_id.to_string(),
            payload: payload.clone(),
        };

        let mut pending = self.lock();
        let Some(mut record) = self.store.get_epic(epic_id) else {
            return Err(DispatchError::UnknownEpic(epic_id.to_string()));
        };

        let next = request
            .transition()
            .and_then(|t| match t {
                Some(t) => apply(&record.workflow, t),
                None => Ok(record.workflow.clone()),
            })
            .map_err(|rejection| {
                warn!(epic = %epic_id, %action, reason = rejection.tag(), "local action rejected: {}", rejection);
                DispatchError::Rejected(rejection)
            })?;

        let base = pending
            .get(epic_id)
            .map(|p| p.base.clone())
            .unwrap_or_else(|| record.workflow.clone());
        pending.insert(
            epic_id.to_string(),
            Pending {
                base,
                optimistic: next.clone(),
            },
        );

        let from = record.state();
        record.set_workflow(next, Utc::now());
        self.store.put(record.clone());
        info!(epic = %epic_id, %action, %from, to = %record.state(), "local action applied");

        // Canonical spelling upstream: "approve-plan" goes out as "approve_plan".
        let action = action
            .parse::<EpicAction>()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|_| action.to_string());
        self.report(ActionReport {
            epic_id: epic_id.to_string(),
            action,
            payload,
            epic: None,
        });
        Ok(record)
    }

    fn create(&self, draft: EpicUpdate) -> Result<EpicRecord, DispatchError> {
        let id = draft.id.trim().to_string();
        if id.is_empty() {
            return Err(DispatchError::EmptyId);
        }

        let _pending = self.lock();
        if self.store.get_epic(&id).is_some() {
            return Err(DispatchError::AlreadyExists(id));
        }

        let now = Utc::now();
        let mut record = EpicRecord::new(id.clone(), now);
        record.merge_details(&draft, now);
        self.store.put(record.clone());
        info!(epic = %id, "epic created");

        let epic = EpicUpdate {
            id: id.clone(),
            state: None,
            ..draft
        };
        self.report(ActionReport {
            epic_id: id,
            action: CREATE_ACTION.to_string(),
            payload: None,
            epic: Some(epic),
        });
        Ok(record)
    }

    fn report(&self, report: ActionReport) {
        match Envelope::with(event::EPIC_ACTION, &report) {
            Ok(envelope) => {
                self.connection.send_envelope(envelope);
            }
            Err(e) => warn!(epic = %report.epic_id, error = %e, "failed to encode action report"),
        }
    }

    fn handle_update(&self, kind: &str, payload: &Value) {
        let update: EpicUpdate = match protocol::decode(kind, payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "dropping malformed event");
                return;
            }
        };
        if update.id.is_empty() {
            warn!(event = kind, "dropping event without an epic id");
            return;
        }

        let mut pending = self.lock();
        let now = Utc::now();
        let (mut record, created) = match self.store.get_epic(&update.id) {
            Some(record) => (record, false),
            None => {
                debug!(epic = %update.id, "first sighting, creating placeholder");
                (EpicRecord::new(update.id.clone(), now), true)
            }
        };

        let Some(target) = update.state else {
            record.merge_details(&update, now);
            self.store.put(record);
            return;
        };

        let outcome = match pending.get(&update.id) {
            Some(p) if p.optimistic.state == target => {
                debug!(epic = %update.id, state = %target, "optimistic change confirmed");
                Ok(record.workflow.clone())
            }
            Some(p) if p.base.state == target => {
                info!(epic = %update.id, state = %target, "optimistic change reverted by control plane");
                Ok(p.base.clone())
            }
            Some(p) => apply(&p.base, Transition::Remote(target)),
            None => apply(&record.workflow, Transition::Remote(target)),
        };

        match outcome {
            Ok(next) => {
                pending.remove(&update.id);
                let from = record.state();
                record.set_workflow(next, now);
                record.merge_details(&update, now);
                debug!(epic = %update.id, %from, to = %record.state(), "remote event applied");
                self.store.put(record);
            }
            Err(rejection) => {
                warn!(
                    epic = %update.id,
                    event = kind,
                    reason = rejection.tag(),
                    "remote event rejected: {}",
                    rejection
                );
                if created {
                    record.merge_details(&update, now);
                    self.store.put(record);
                }
            }
        }
    }

    fn handle_snapshot(&self, payload: &Value) {
        let snapshot: Snapshot = match protocol::decode(event::EPICS_SNAPSHOT, payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "dropping malformed snapshot");
                return;
            }
        };

        let mut pending = self.lock();
        let count = snapshot.epics.len();
        for mut epic in snapshot.epics {
            if epic.id.is_empty() {
                warn!("snapshot entry without an epic id, skipping");
                continue;
            }
            let wf = &mut epic.workflow;
            wf.current_step = wf.current_step.min(wf.total_steps);
            pending.remove(&epic.id);
            self.store.put(epic);
        }
        info!(epics = count, "snapshot applied");
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
