// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for armada-core operations.

use thiserror::Error;

/// All possible errors that can occur in armada-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid epic state: '{0}'\n  hint: valid states are: open, queued_for_planning, planning, planning_review, revising, approved, assigning, executing, pr_created, code_review, approved_for_merge, merging, documenting, done, failed, cancelled")]
    InvalidState(String),

    #[error("invalid action: '{0}'\n  hint: valid actions are: approve_plan, revise, request_changes, merge, approve_merge, cancel, retry")]
    InvalidAction(String),

    #[error("invalid {event} payload: {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for armada-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
