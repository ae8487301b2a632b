// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use armada_core::protocol::Snapshot;
use armada_core::{EpicUpdate, DEFAULT_TOTAL_STEPS};

fn sim() -> Simulator {
    Simulator::new(SimulationConfig::default(), Utc::now())
}

#[test]
fn opening_greets_then_snapshots_demo_epic() {
    let events = sim().opening();
    let kinds: Vec<_> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, ["connected", "epics.snapshot"]);

    let snapshot: Snapshot = events[1].decode_payload().unwrap();
    assert_eq!(snapshot.epics.len(), 1);
    assert_eq!(snapshot.epics[0].id, "SIM-1");
    assert_eq!(snapshot.epics[0].state(), EpicState::Open);
}

#[test]
fn tick_reports_activity_then_next_state() {
    let mut sim = sim();
    let events = sim.tick(Utc::now());
    let kinds: Vec<_> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, ["activity.new", "epic.updated"]);

    let update: EpicUpdate = events[1].decode_payload().unwrap();
    assert_eq!(update.state, Some(EpicState::QueuedForPlanning));
    assert_eq!(events[0].payload["epicId"], "SIM-1");
}

#[test]
fn walks_happy_path_to_done_then_restarts() {
    let mut sim = sim();
    for _ in 0..DEFAULT_TOTAL_STEPS {
        sim.tick(Utc::now());
    }
    assert_eq!(sim.epic().state(), EpicState::Done);
    assert_eq!(sim.epic().workflow.current_step, DEFAULT_TOTAL_STEPS);
    assert_eq!(sim.epic().progress, 100);
    assert!(sim.epic().completed_at.is_some());

    let events = sim.tick(Utc::now());
    assert_eq!(events.last().unwrap().kind, "epics.snapshot");
    assert_eq!(sim.epic().state(), EpicState::Open);
    assert_eq!(sim.epic().workflow.current_step, 0);
}

#[test]
fn custom_demo_epic_id() {
    let config = SimulationConfig {
        demo_epic: "DEMO-9".into(),
        ..SimulationConfig::default()
    };
    let mut sim = Simulator::new(config, Utc::now());
    let events = sim.tick(Utc::now());
    assert_eq!(events[0].payload["epicId"], "DEMO-9");
}
