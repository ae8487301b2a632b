// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Core epic types for the armada pipeline.
//!
//! This module contains the fundamental data types: EpicState, EpicAction,
//! Workflow, EpicRecord and EpicUpdate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of forward moves on the canonical path from `open` to `done`.
pub const DEFAULT_TOTAL_STEPS: u32 = 12;

fn default_total_steps() -> u32 {
    DEFAULT_TOTAL_STEPS
}

/// Position of an epic in the planning → coding → review → merge pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicState {
    /// Imported from the tracker, not yet picked up. Initial state.
    Open,
    QueuedForPlanning,
    Planning,
    /// Plan produced, waiting for a human decision.
    PlanningReview,
    /// Changes requested from a review state; returns to the matching working state.
    Revising,
    Approved,
    Assigning,
    Executing,
    PrCreated,
    /// Pull request open, waiting for a human decision.
    CodeReview,
    ApprovedForMerge,
    Merging,
    Documenting,
    /// Successfully completed.
    Done,
    /// Stopped by an unrecoverable error. Only `retry` leaves it.
    Failed,
    /// Stopped by an operator.
    Cancelled,
}

impl EpicState {
    /// Every state, in pipeline order followed by the side exits.
    pub const ALL: [EpicState; 16] = [
        EpicState::Open,
        EpicState::QueuedForPlanning,
        EpicState::Planning,
        EpicState::PlanningReview,
        EpicState::Revising,
        EpicState::Approved,
        EpicState::Assigning,
        EpicState::Executing,
        EpicState::PrCreated,
        EpicState::CodeReview,
        EpicState::ApprovedForMerge,
        EpicState::Merging,
        EpicState::Documenting,
        EpicState::Done,
        EpicState::Failed,
        EpicState::Cancelled,
    ];

    /// Returns the string representation used on the wire and in display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EpicState::Open => "open",
            EpicState::QueuedForPlanning => "queued_for_planning",
            EpicState::Planning => "planning",
            EpicState::PlanningReview => "planning_review",
            EpicState::Revising => "revising",
            EpicState::Approved => "approved",
            EpicState::Assigning => "assigning",
            EpicState::Executing => "executing",
            EpicState::PrCreated => "pr_created",
            EpicState::CodeReview => "code_review",
            EpicState::ApprovedForMerge => "approved_for_merge",
            EpicState::Merging => "merging",
            EpicState::Documenting => "documenting",
            EpicState::Done => "done",
            EpicState::Failed => "failed",
            EpicState::Cancelled => "cancelled",
        }
    }

    /// Returns true for `done`, `failed` and `cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EpicState::Done | EpicState::Failed | EpicState::Cancelled
        )
    }

    /// Returns true if this is an active state (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// States one forward step away on the pipeline.
    ///
    /// Side exits (`failed`, `cancelled`) are not listed; they are reachable
    /// from every active state.
    pub fn successors(&self) -> &'static [EpicState] {
        match self {
            EpicState::Open => &[EpicState::QueuedForPlanning],
            EpicState::QueuedForPlanning => &[EpicState::Planning],
            EpicState::Planning => &[EpicState::PlanningReview],
            EpicState::PlanningReview => &[EpicState::Approved, EpicState::Revising],
            EpicState::Revising => &[EpicState::Planning, EpicState::Executing],
            EpicState::Approved => &[EpicState::Assigning],
            EpicState::Assigning => &[EpicState::Executing],
            EpicState::Executing => &[EpicState::PrCreated],
            EpicState::PrCreated => &[EpicState::CodeReview],
            EpicState::CodeReview => &[EpicState::ApprovedForMerge, EpicState::Revising],
            EpicState::ApprovedForMerge => &[EpicState::Merging],
            EpicState::Merging => &[EpicState::Documenting],
            EpicState::Documenting => &[EpicState::Done],
            EpicState::Done | EpicState::Failed | EpicState::Cancelled => &[],
        }
    }
}

impl fmt::Display for EpicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EpicState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        EpicState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| Error::InvalidState(s.to_string()))
    }
}

/// A human-initiated action on an epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicAction {
    ApprovePlan,
    Revise,
    RequestChanges,
    Merge,
    ApproveMerge,
    Cancel,
    Retry,
}

impl EpicAction {
    /// Returns the string representation used on the wire and in display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EpicAction::ApprovePlan => "approve_plan",
            EpicAction::Revise => "revise",
            EpicAction::RequestChanges => "request_changes",
            EpicAction::Merge => "merge",
            EpicAction::ApproveMerge => "approve_merge",
            EpicAction::Cancel => "cancel",
            EpicAction::Retry => "retry",
        }
    }
}

impl fmt::Display for EpicAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EpicAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "approve_plan" => Ok(EpicAction::ApprovePlan),
            "revise" => Ok(EpicAction::Revise),
            "request_changes" => Ok(EpicAction::RequestChanges),
            "merge" => Ok(EpicAction::Merge),
            "approve_merge" => Ok(EpicAction::ApproveMerge),
            "cancel" => Ok(EpicAction::Cancel),
            "retry" => Ok(EpicAction::Retry),
            _ => Err(Error::InvalidAction(s.to_string())),
        }
    }
}

/// The workflow fields of an epic: everything the state machine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(rename = "currentState", alias = "status")]
    pub state: EpicState,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default = "default_total_steps")]
    pub total_steps: u32,
    /// State the epic was in when it entered `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_from: Option<EpicState>,
    /// Review state that sent the epic to `revising`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revising_from: Option<EpicState>,
}

impl Workflow {
    /// A fresh workflow at `open`, step 0.
    pub fn new() -> Self {
        Workflow {
            state: EpicState::Open,
            current_step: 0,
            total_steps: DEFAULT_TOTAL_STEPS,
            failed_from: None,
            revising_from: None,
        }
    }

    /// Completion as a percentage of `total_steps`.
    pub fn percent(&self) -> u8 {
        if self.total_steps == 0 {
            return 0;
        }
        let pct = u64::from(self.current_step) * 100 / u64::from(self.total_steps);
        pct.min(100) as u8
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

/// The record the dashboard keeps for one epic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicRecord {
    pub id: String,
    /// External tracker key (e.g. a Jira key).
    #[serde(default, alias = "jiraKey")]
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(flatten)]
    pub workflow: Workflow,
    /// Agent currently working the epic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    /// Human owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Agent-reported progress within the current step (0-100).
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, alias = "jiraUrl", skip_serializing_if = "Option::is_none")]
    pub tracker_url: Option<String>,
    #[serde(
        default,
        alias = "confluencePageUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub docs_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl EpicRecord {
    /// Creates a minimal record at `open` for an epic seen for the first time.
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let id = id.into();
        EpicRecord {
            key: id.clone(),
            id,
            summary: String::new(),
            description: String::new(),
            target_repo: String::new(),
            feature_branch: None,
            labels: Vec::new(),
            workflow: Workflow::new(),
            current_agent: None,
            assignee: None,
            progress: 0,
            pr_url: None,
            pr_number: None,
            tracker_url: None,
            docs_url: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Current workflow state.
    pub fn state(&self) -> EpicState {
        self.workflow.state
    }

    /// Replaces the workflow fields after an accepted transition.
    pub fn set_workflow(&mut self, workflow: Workflow, now: DateTime<Utc>) {
        if workflow.state == EpicState::Done && self.workflow.state != EpicState::Done {
            self.completed_at = Some(now);
        }
        self.workflow = workflow;
        self.updated_at = now;
    }

    /// Merges the descriptive, assignment and artifact fields of an update.
    ///
    /// Never touches `currentState` or `currentStep`. A `totalSteps` value is
    /// adopted only when it keeps `currentStep <= totalSteps`.
    pub fn merge_details(&mut self, update: &EpicUpdate, now: DateTime<Utc>) {
        fn set<T: Clone>(field: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *field = v.clone();
            }
        }
        fn set_opt<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                field.clone_from(value);
            }
        }

        set(&mut self.key, &update.key);
        set(&mut self.summary, &update.summary);
        set(&mut self.description, &update.description);
        set(&mut self.target_repo, &update.target_repo);
        set(&mut self.labels, &update.labels);
        set(&mut self.progress, &update.progress.map(|p| p.min(100)));
        set_opt(&mut self.feature_branch, &update.feature_branch);
        set_opt(&mut self.current_agent, &update.current_agent);
        set_opt(&mut self.assignee, &update.assignee);
        set_opt(&mut self.pr_url, &update.pr_url);
        set_opt(&mut self.pr_number, &update.pr_number);
        set_opt(&mut self.tracker_url, &update.tracker_url);
        set_opt(&mut self.docs_url, &update.docs_url);

        if let Some(total) = update.total_steps {
            if total >= 1 && total >= self.workflow.current_step {
                self.workflow.total_steps = total;
            }
        }
        self.updated_at = now;
    }
}

/// A partial epic record as reported by the control plane.
///
/// `id` is required; every other field is optional and only present fields
/// are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicUpdate {
    pub id: String,
    #[serde(default, alias = "jiraKey", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(
        default,
        rename = "currentState",
        alias = "status",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<EpicState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, alias = "jiraUrl", skip_serializing_if = "Option::is_none")]
    pub tracker_url: Option<String>,
    #[serde(
        default,
        alias = "confluencePageUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub docs_url: Option<String>,
}

impl EpicUpdate {
    /// An update that only reports a new state.
    pub fn state(id: impl Into<String>, state: EpicState) -> Self {
        EpicUpdate {
            id: id.into(),
            state: Some(state),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[path = "epic_tests.rs"]
mod tests;
