// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Epic lifecycle state machine.
//!
//! [`apply`] is a pure function: given the current [`Workflow`] and a
//! [`Transition`] it returns either the next workflow or a [`Rejection`].
//! Nothing here performs I/O or reads the clock.
//!
//! Remote events walk the pipeline one step at a time. Local actions are
//! accepted only from the states that offer them to an operator.

use serde_json::Value;
use thiserror::Error;

use crate::epic::{EpicAction, EpicState, EpicUpdate, Workflow};

/// A validated transition input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The control plane reports that the epic reached this state.
    Remote(EpicState),
    /// An operator asked for this action.
    Local(EpicAction),
}

/// A transition request as it arrives at the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionRequest {
    Remote {
        event_type: String,
        epic_id: String,
        update: EpicUpdate,
    },
    Local {
        action: String,
        epic_id: String,
        payload: Option<Value>,
    },
}

impl TransitionRequest {
    pub fn epic_id(&self) -> &str {
        match self {
            TransitionRequest::Remote { epic_id, .. } | TransitionRequest::Local { epic_id, .. } => {
                epic_id
            }
        }
    }

    /// Resolves the request to a state-machine input.
    ///
    /// Returns `Ok(None)` for a remote report that carries no state (only
    /// informational fields). An action name that does not parse is
    /// rejected with [`Rejection::UnknownAction`].
    pub fn transition(&self) -> Result<Option<Transition>, Rejection> {
        match self {
            TransitionRequest::Remote { update, .. } => Ok(update.state.map(Transition::Remote)),
            TransitionRequest::Local { action, .. } => action
                .parse::<EpicAction>()
                .map(|a| Some(Transition::Local(a)))
                .map_err(|_| Rejection::UnknownAction(action.clone())),
        }
    }
}

/// Why a transition was refused. The record is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("cannot move from {from} via {requested}: not valid in the current state")]
    InvalidSourceState { from: EpicState, requested: String },

    #[error("unknown action: '{0}'")]
    UnknownAction(String),

    #[error("epic is already {state}")]
    AlreadyTerminal { state: EpicState },
}

impl Rejection {
    /// Stable reason tag reported to callers and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Rejection::InvalidSourceState { .. } => "invalid-source-state",
            Rejection::UnknownAction(_) => "unknown-action",
            Rejection::AlreadyTerminal { .. } => "already-terminal",
        }
    }
}

/// Applies `transition` to `current`.
pub fn apply(current: &Workflow, transition: Transition) -> Result<Workflow, Rejection> {
    match transition {
        Transition::Remote(target) => apply_remote(current, target),
        Transition::Local(action) => apply_local(current, action),
    }
}

fn invalid(from: EpicState, requested: impl ToString) -> Rejection {
    Rejection::InvalidSourceState {
        from,
        requested: requested.to_string(),
    }
}

fn apply_remote(current: &Workflow, target: EpicState) -> Result<Workflow, Rejection> {
    let from = current.state;
    if from.is_terminal() {
        return Err(Rejection::AlreadyTerminal { state: from });
    }

    match target {
        EpicState::Failed => {
            let mut next = current.clone();
            next.state = EpicState::Failed;
            next.failed_from = Some(from);
            return Ok(next);
        }
        EpicState::Cancelled => return Ok(enter_cancelled(current)),
        _ => {}
    }

    if !from.successors().contains(&target) {
        return Err(invalid(from, target));
    }
    if from == EpicState::Revising {
        let allowed = match current.revising_from {
            Some(EpicState::PlanningReview) => target == EpicState::Planning,
            Some(EpicState::CodeReview) => target == EpicState::Executing,
            _ => true,
        };
        if !allowed {
            return Err(invalid(from, target));
        }
    }

    Ok(step_to(current, target))
}

fn apply_local(current: &Workflow, action: EpicAction) -> Result<Workflow, Rejection> {
    let from = current.state;

    if action == EpicAction::Retry {
        return match from {
            EpicState::Failed => {
                let mut next = current.clone();
                next.state = current.failed_from.unwrap_or(EpicState::Open);
                next.failed_from = None;
                Ok(next)
            }
            s if s.is_terminal() => Err(Rejection::AlreadyTerminal { state: s }),
            s => Err(invalid(s, action)),
        };
    }

    if from.is_terminal() {
        return Err(Rejection::AlreadyTerminal { state: from });
    }

    match (action, from) {
        (EpicAction::ApprovePlan, EpicState::PlanningReview) => {
            Ok(step_to(current, EpicState::Executing))
        }
        (
            EpicAction::Revise | EpicAction::RequestChanges,
            EpicState::PlanningReview | EpicState::CodeReview,
        ) => Ok(step_to(current, EpicState::Revising)),
        (
            EpicAction::Merge | EpicAction::ApproveMerge,
            EpicState::CodeReview | EpicState::ApprovedForMerge,
        ) => Ok(step_to(current, EpicState::Merging)),
        (EpicAction::Cancel, _) => Ok(enter_cancelled(current)),
        _ => Err(invalid(from, action)),
    }
}

/// Moves to a non-terminal `target`, maintaining the step counter and the
/// revising bookkeeping.
fn step_to(current: &Workflow, target: EpicState) -> Workflow {
    let from = current.state;
    let mut next = current.clone();
    next.state = target;

    if target == EpicState::Revising {
        next.revising_from = Some(from);
    } else if from == EpicState::Revising {
        next.revising_from = None;
    }

    let lateral = from == EpicState::Revising || target == EpicState::Revising;
    if !lateral {
        next.current_step = current
            .current_step
            .saturating_add(1)
            .min(current.total_steps);
    }
    next
}

fn enter_cancelled(current: &Workflow) -> Workflow {
    let mut next = current.clone();
    next.state = EpicState::Cancelled;
    next
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
