// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod act;
pub mod config;
pub mod watch;

use armada_core::EpicRecord;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::store::EpicStore;
use crate::sync::ConnectionManager;

/// Connection, store and dispatcher wired together for one command.
pub(crate) struct Session {
    pub connection: ConnectionManager,
    pub store: EpicStore,
    pub dispatcher: Dispatcher,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self::with_connection(
            ConnectionManager::new(config),
            config.store.activity_capacity,
        )
    }

    pub fn with_connection(connection: ConnectionManager, activity_capacity: usize) -> Self {
        let store = EpicStore::new(activity_capacity);
        let dispatcher = Dispatcher::new(store.clone(), connection.clone());
        Session {
            connection,
            store,
            dispatcher,
        }
    }
}

/// One-line summary of an epic: `GA-33 planning_review 3/12 coder "Login flow"`.
pub(crate) fn format_epic(epic: &EpicRecord) -> String {
    let mut line = format!(
        "{} {} {}/{}",
        epic.id, epic.workflow.state, epic.workflow.current_step, epic.workflow.total_steps
    );
    if let Some(agent) = &epic.current_agent {
        line.push(' ');
        line.push_str(agent);
    }
    if !epic.summary.is_empty() {
        line.push_str(&format!(" \"{}\"", epic.summary));
    }
    line
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
