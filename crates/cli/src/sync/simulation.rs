// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline event source for demo mode.
//!
//! The simulator owns one demo epic and walks it along the pipeline, one
//! state per tick, emitting the same envelopes a control plane would. When
//! the epic reaches `done` it is reset with a fresh snapshot.

use armada_core::machine::{apply, Transition};
use armada_core::protocol::event;
use armada_core::{EpicRecord, EpicState, Envelope};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::warn;

use crate::config::SimulationConfig;

pub struct Simulator {
    config: SimulationConfig,
    epic: EpicRecord,
    ticks: u64,
}

impl Simulator {
    pub fn new(config: SimulationConfig, now: DateTime<Utc>) -> Self {
        let epic = demo_epic(&config.demo_epic, now);
        Simulator {
            config,
            epic,
            ticks: 0,
        }
    }

    /// The demo epic as last reported.
    pub fn epic(&self) -> &EpicRecord {
        &self.epic
    }

    /// Events delivered as soon as the simulated connection opens.
    pub fn opening(&self) -> Vec<Envelope> {
        let mut out = vec![Envelope::connected("simulation mode")];
        out.extend(encode(Envelope::snapshot(vec![self.epic.clone()])));
        out
    }

    /// Advances the demo epic one state and reports it.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Envelope> {
        self.ticks += 1;

        if self.epic.state() == EpicState::Done {
            self.epic = demo_epic(&self.config.demo_epic, now);
            let mut out = vec![self.activity("restarted demo epic", now)];
            out.extend(encode(Envelope::snapshot(vec![self.epic.clone()])));
            return out;
        }

        let from = self.epic.state();
        let Some(&next) = from.successors().first() else {
            return Vec::new();
        };
        match apply(&self.epic.workflow, Transition::Remote(next)) {
            Ok(workflow) => {
                self.epic.set_workflow(workflow, now);
                self.epic.current_agent = Some(agent_for(next).to_string());
                self.epic.progress = self.epic.workflow.percent();
            }
            Err(reason) => {
                warn!(epic = %self.epic.id, %reason, "simulation could not advance");
                return Vec::new();
            }
        }

        let message = format!("{} moved from {} to {}", self.epic.id, from, next);
        let mut out = vec![self.activity(&message, now)];
        out.extend(encode(Envelope::epic_updated(&self.epic)));
        out
    }

    fn activity(&self, message: &str, now: DateTime<Utc>) -> Envelope {
        Envelope::new(
            event::ACTIVITY_NEW,
            json!({
                "id": format!("sim-{}", self.ticks),
                "type": "agent",
                "agent": agent_for(self.epic.state()),
                "epicId": self.epic.id,
                "message": message,
                "timestamp": now.to_rfc3339(),
            }),
        )
    }
}

fn encode(result: armada_core::Result<Envelope>) -> Option<Envelope> {
    result
        .map_err(|e| warn!(error = %e, "failed to encode simulated event"))
        .ok()
}

fn demo_epic(id: &str, now: DateTime<Utc>) -> EpicRecord {
    let mut epic = EpicRecord::new(id, now);
    epic.summary = "Simulated epic".to_string();
    epic.description = "Walks the pipeline while no control plane is attached.".to_string();
    epic.target_repo = "demo/app".to_string();
    epic.labels = vec!["simulation".to_string()];
    epic
}

fn agent_for(state: EpicState) -> &'static str {
    match state {
        EpicState::QueuedForPlanning | EpicState::Planning | EpicState::PlanningReview => "planner",
        EpicState::Executing | EpicState::PrCreated | EpicState::Revising => "coder",
        EpicState::CodeReview | EpicState::ApprovedForMerge => "reviewer",
        EpicState::Merging => "merger",
        EpicState::Documenting => "documenter",
        _ => "orchestrator",
    }
}

#[cfg(test)]
#[path = "simulation_tests.rs"]
mod tests;
