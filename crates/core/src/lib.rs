// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! armada-core: shared library for the armada dashboard
//!
//! This crate provides the epic data model, the lifecycle state machine and
//! the wire protocol used by both the `armada` client and `armada-remote`.

pub mod epic;
pub mod error;
pub mod machine;
pub mod protocol;

pub use epic::{EpicAction, EpicRecord, EpicState, EpicUpdate, Workflow, DEFAULT_TOTAL_STEPS};
pub use error::{Error, Result};
pub use machine::{apply, Rejection, Transition, TransitionRequest};
pub use protocol::{ActionReport, Envelope, MessagePayload, Snapshot};
