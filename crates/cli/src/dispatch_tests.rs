// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use armada_core::EpicState::{self, *};
use serde_json::json;
use yare::parameterized;

use super::*;
use crate::sync::test_helpers::{settle, test_connection_config, MockRemote};

struct Harness {
    remote: MockRemote,
    manager: ConnectionManager,
    dispatcher: Dispatcher,
}

impl Harness {
    async fn connected() -> Self {
        let remote = MockRemote::new();
        let manager =
            ConnectionManager::with_transport(test_connection_config(), remote.factory());
        let dispatcher = Dispatcher::new(EpicStore::new(50), manager.clone());
        manager.connect();
        settle().await;
        Harness {
            remote,
            manager,
            dispatcher,
        }
    }

    async fn push(&self, kind: &str, payload: Value) {
        self.remote.push(&Envelope::new(kind, payload));
        settle().await;
    }

    /// Seeds the store through a snapshot.
    async fn seed(&self, id: &str, state: EpicState, step: u32) {
        let mut record = EpicRecord::new(id, Utc::now());
        record.workflow.state = state;
        record.workflow.current_step = step;
        self.remote.push(&Envelope::snapshot(vec![record]).unwrap());
        settle().await;
    }

    fn epic(&self, id: &str) -> EpicRecord {
        self.dispatcher.store().get_epic(id).unwrap()
    }

    fn actions_sent(&self) -> Vec<ActionReport> {
        self.remote
            .sent_of(event::EPIC_ACTION)
            .iter()
            .map(|e| e.decode_payload().unwrap())
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn remote_event_advances_and_duplicate_is_dropped() {
    let h = Harness::connected().await;
    h.seed("GA-33", Planning, 2).await;

    let update = json!({ "id": "GA-33", "currentState": "planning_review" });
    h.push(event::EPIC_UPDATED, update.clone()).await;
    let epic = h.epic("GA-33");
    assert_eq!(epic.state(), PlanningReview);
    assert_eq!(epic.workflow.current_step, 3);

    h.push(event::EPIC_UPDATED, update).await;
    let epic = h.epic("GA-33");
    assert_eq!(epic.state(), PlanningReview);
    assert_eq!(epic.workflow.current_step, 3);
}

#[tokio::test(start_paused = true)]
async fn events_are_applied_in_arrival_order_per_epic() {
    let h = Harness::connected().await;
    h.seed("GA-1", PlanningReview, 3).await;
    h.seed("GA-2", Planning, 2).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let _watch = h.dispatcher.store().subscribe(move |change| {
        if let crate::store::StoreChange::Epic(id) = change {
            recorder.lock().unwrap().push(id.clone());
        }
    });

    h.dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap();
    // Delivered back to back, before the dispatcher gets to run.
    for (id, state) in [
        ("GA-1", "executing"),
        ("GA-1", "pr_created"),
        ("GA-2", "planning_review"),
    ] {
        h.remote.push(&Envelope::new(
            event::EPIC_UPDATED,
            json!({ "id": id, "currentState": state }),
        ));
    }
    settle().await;

    // Confirmation first, then the next step on top of it.
    let a = h.epic("GA-1");
    assert_eq!(a.state(), PrCreated);
    assert_eq!(a.workflow.current_step, 5);
    assert!(!h.dispatcher.is_pending("GA-1"));

    let b = h.epic("GA-2");
    assert_eq!(b.state(), PlanningReview);
    assert_eq!(b.workflow.current_step, 3);

    assert_eq!(*seen.lock().unwrap(), ["GA-1", "GA-1", "GA-1", "GA-2"]);
}

#[tokio::test(start_paused = true)]
async fn unseen_epic_gets_placeholder() {
    let h = Harness::connected().await;
    h.push(
        event::EPIC_UPDATED,
        json!({ "id": "GA-7", "currentState": "queued_for_planning", "summary": "Login" }),
    )
    .await;

    let epic = h.epic("GA-7");
    assert_eq!(epic.state(), QueuedForPlanning);
    assert_eq!(epic.workflow.current_step, 1);
    assert_eq!(epic.summary, "Login");
}

#[tokio::test(start_paused = true)]
async fn placeholder_is_kept_when_first_event_is_rejected() {
    let h = Harness::connected().await;
    h.push(
        event::EPIC_UPDATED,
        json!({ "id": "GA-8", "currentState": "merging", "summary": "Late joiner" }),
    )
    .await;

    let epic = h.epic("GA-8");
    assert_eq!(epic.state(), Open);
    assert_eq!(epic.workflow.current_step, 0);
    assert_eq!(epic.summary, "Late joiner");
}

#[tokio::test(start_paused = true)]
async fn approve_plan_outside_planning_review_is_rejected_without_send() {
    let h = Harness::connected().await;
    h.seed("GA-1", Executing, 7).await;

    let err = h
        .dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap_err();
    let DispatchError::Rejected(rejection) = err else {
        panic!("expected a rejection, got {:?}", err);
    };
    assert_eq!(rejection.tag(), "invalid-source-state");

    settle().await;
    assert_eq!(h.epic("GA-1").state(), Executing);
    assert_eq!(h.epic("GA-1").workflow.current_step, 7);
    assert!(h.actions_sent().is_empty());
    assert!(!h.dispatcher.is_pending("GA-1"));
}

#[tokio::test(start_paused = true)]
async fn approve_plan_applies_optimistically_and_reports() {
    let h = Harness::connected().await;
    h.seed("GA-1", PlanningReview, 3).await;

    let epic = h
        .dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap();
    assert_eq!(epic.state(), Executing);
    assert_eq!(epic.workflow.current_step, 4);
    assert_eq!(h.epic("GA-1").state(), Executing);
    assert!(h.dispatcher.is_pending("GA-1"));

    settle().await;
    let sent = h.actions_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].epic_id, "GA-1");
    assert_eq!(sent[0].action, "approve_plan");
    assert!(sent[0].epic.is_none());
}

#[tokio::test(start_paused = true)]
async fn action_is_reported_with_canonical_name_and_payload() {
    let h = Harness::connected().await;
    h.seed("GA-1", CodeReview, 9).await;

    h.dispatcher
        .dispatch_action("GA-1", "request-changes", Some(json!({ "comment": "tests" })))
        .unwrap();
    settle().await;

    let sent = h.actions_sent();
    assert_eq!(sent[0].action, "request_changes");
    assert_eq!(sent[0].payload, Some(json!({ "comment": "tests" })));
    assert_eq!(h.epic("GA-1").state(), Revising);
}

/// Approves GA-1 at `planning_review`, then lets the control plane report `remote_state`.
async fn settle_approval(remote_state: &str) -> Harness {
    let h = Harness::connected().await;
    h.seed("GA-1", PlanningReview, 3).await;
    h.dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap();
    h.push(
        event::EPIC_UPDATED,
        json!({ "id": "GA-1", "currentState": remote_state }),
    )
    .await;
    h
}

#[tokio::test(start_paused = true)]
async fn matching_remote_state_confirms_optimistic_change() {
    let h = settle_approval("executing").await;
    let epic = h.epic("GA-1");
    assert_eq!(epic.state(), Executing);
    assert_eq!(epic.workflow.current_step, 4);
    assert!(!h.dispatcher.is_pending("GA-1"));
}

#[tokio::test(start_paused = true)]
async fn base_remote_state_reverts_optimistic_change() {
    let h = settle_approval("planning_review").await;
    let epic = h.epic("GA-1");
    assert_eq!(epic.state(), PlanningReview);
    assert_eq!(epic.workflow.current_step, 3);
    assert!(!h.dispatcher.is_pending("GA-1"));
}

#[tokio::test(start_paused = true)]
async fn other_remote_state_is_validated_against_base() {
    let h = settle_approval("failed").await;
    let epic = h.epic("GA-1");
    assert_eq!(epic.state(), Failed);
    assert_eq!(epic.workflow.current_step, 3);
    assert_eq!(epic.workflow.failed_from, Some(PlanningReview));
    assert!(!h.dispatcher.is_pending("GA-1"));
}

#[tokio::test(start_paused = true)]
async fn invalid_remote_state_keeps_optimistic_change() {
    let h = settle_approval("merging").await;
    assert_eq!(h.epic("GA-1").state(), Executing);
    assert!(h.dispatcher.is_pending("GA-1"));
}

#[tokio::test(start_paused = true)]
async fn second_local_action_keeps_original_base() {
    let h = Harness::connected().await;
    h.seed("GA-1", PlanningReview, 3).await;
    h.dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap();
    h.dispatcher.dispatch_action("GA-1", "cancel", None).unwrap();
    assert_eq!(h.epic("GA-1").state(), Cancelled);

    // The control plane refused both: back to the last confirmed state.
    h.push(
        event::EPIC_UPDATED,
        json!({ "id": "GA-1", "currentState": "planning_review" }),
    )
    .await;
    assert_eq!(h.epic("GA-1").state(), PlanningReview);
    assert_eq!(h.epic("GA-1").workflow.current_step, 3);
}

#[tokio::test(start_paused = true)]
async fn dispatch_errors() {
    let h = Harness::connected().await;
    h.seed("GA-1", Done, 12).await;

    assert_eq!(
        h.dispatcher.dispatch_action("GA-404", "cancel", None),
        Err(DispatchError::UnknownEpic("GA-404".into()))
    );
    assert_eq!(
        h.dispatcher.dispatch_action("GA-1", "launch", None),
        Err(DispatchError::Rejected(Rejection::UnknownAction(
            "launch".into()
        )))
    );
    assert_eq!(
        h.dispatcher.dispatch_action("GA-1", "cancel", None),
        Err(DispatchError::Rejected(Rejection::AlreadyTerminal {
            state: Done
        }))
    );
    settle().await;
    assert!(h.actions_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_restores_state_recorded_at_failure() {
    let h = Harness::connected().await;
    h.seed("GA-1", Executing, 7).await;
    h.push(
        event::EPIC_UPDATED,
        json!({ "id": "GA-1", "currentState": "failed" }),
    )
    .await;
    assert_eq!(h.epic("GA-1").state(), Failed);

    let epic = h.dispatcher.dispatch_action("GA-1", "retry", None).unwrap();
    assert_eq!(epic.state(), Executing);
    assert_eq!(epic.workflow.current_step, 7);
}

#[tokio::test(start_paused = true)]
async fn action_while_disconnected_is_applied_but_not_sent() {
    let h = Harness::connected().await;
    h.seed("GA-1", PlanningReview, 3).await;
    h.manager.disconnect();

    let epic = h
        .dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap();
    assert_eq!(epic.state(), Executing);
    settle().await;
    assert!(h.actions_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn progress_without_state_merges_details_only() {
    let h = Harness::connected().await;
    h.seed("GA-1", Executing, 7).await;

    h.push(
        event::EPIC_PROGRESS,
        json!({ "id": "GA-1", "currentAgent": "coder", "progress": 140, "prUrl": "https://example.com/pr/5" }),
    )
    .await;

    let epic = h.epic("GA-1");
    assert_eq!(epic.state(), Executing);
    assert_eq!(epic.workflow.current_step, 7);
    assert_eq!(epic.current_agent.as_deref(), Some("coder"));
    assert_eq!(epic.progress, 100);
    assert_eq!(epic.pr_url.as_deref(), Some("https://example.com/pr/5"));
}

#[tokio::test(start_paused = true)]
async fn progress_with_state_is_a_transition() {
    let h = Harness::connected().await;
    h.seed("GA-1", Executing, 7).await;
    h.push(
        event::EPIC_PROGRESS,
        json!({ "id": "GA-1", "currentState": "pr_created" }),
    )
    .await;
    assert_eq!(h.epic("GA-1").state(), PrCreated);
    assert_eq!(h.epic("GA-1").workflow.current_step, 8);
}

#[tokio::test(start_paused = true)]
async fn malformed_events_are_dropped_and_later_ones_processed() {
    let h = Harness::connected().await;
    h.seed("GA-1", Open, 0).await;

    h.push(event::EPIC_UPDATED, json!({ "currentState": "planning" }))
        .await;
    h.push(event::EPIC_UPDATED, json!({ "id": "GA-1", "currentState": "sleeping" }))
        .await;
    h.push(event::EPIC_UPDATED, json!({ "id": "", "currentState": "queued_for_planning" }))
        .await;
    h.push(event::EPICS_SNAPSHOT, json!({ "epics": "nope" })).await;
    h.push(
        event::EPIC_UPDATED,
        json!({ "id": "GA-1", "currentState": "queued_for_planning" }),
    )
    .await;

    assert_eq!(h.dispatcher.store().len(), 1);
    assert_eq!(h.epic("GA-1").state(), QueuedForPlanning);
}

#[tokio::test(start_paused = true)]
async fn snapshot_clamps_step_and_clears_pending() {
    let h = Harness::connected().await;
    h.seed("GA-1", PlanningReview, 3).await;
    h.dispatcher
        .dispatch_action("GA-1", "approve_plan", None)
        .unwrap();

    let mut authoritative = EpicRecord::new("GA-1", Utc::now());
    authoritative.workflow.state = Merging;
    authoritative.workflow.current_step = 40;
    let keep = EpicRecord::new("GA-2", Utc::now());
    h.remote
        .push(&Envelope::snapshot(vec![authoritative]).unwrap());
    settle().await;
    h.remote.push(&Envelope::snapshot(vec![keep]).unwrap());
    settle().await;

    let epic = h.epic("GA-1");
    assert_eq!(epic.state(), Merging);
    assert_eq!(epic.workflow.current_step, 12);
    assert!(!h.dispatcher.is_pending("GA-1"));
    assert_eq!(h.dispatcher.store().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn activity_is_recorded_verbatim() {
    let h = Harness::connected().await;
    let entry = json!({ "id": "a1", "type": "agent", "message": "planning started", "extra": [1, 2] });
    h.push(event::ACTIVITY_NEW, entry.clone()).await;
    assert_eq!(h.dispatcher.store().recent_activity(), [entry]);
}

#[tokio::test(start_paused = true)]
async fn create_epic_inserts_open_record_and_reports() {
    let h = Harness::connected().await;
    let draft = EpicUpdate {
        id: "GA-50".into(),
        summary: Some("Billing export".into()),
        state: Some(Merging),
        ..Default::default()
    };

    let epic = h.dispatcher.create_epic(draft).unwrap();
    assert_eq!(epic.state(), Open);
    assert_eq!(epic.summary, "Billing export");
    assert_eq!(h.epic("GA-50").summary, "Billing export");

    settle().await;
    let sent = h.actions_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, CREATE_ACTION);
    let reported = sent[0].epic.as_ref().unwrap();
    assert_eq!(reported.summary.as_deref(), Some("Billing export"));
    assert_eq!(reported.state, None);
}

#[tokio::test(start_paused = true)]
async fn create_epic_errors() {
    let h = Harness::connected().await;
    h.seed("GA-1", Open, 0).await;

    assert_eq!(
        h.dispatcher.create_epic(EpicUpdate::default()),
        Err(DispatchError::EmptyId)
    );
    assert_eq!(
        h.dispatcher.create_epic(EpicUpdate {
            id: "GA-1".into(),
            ..Default::default()
        }),
        Err(DispatchError::AlreadyExists("GA-1".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_dispatcher_stops_handling_events() {
    let h = Harness::connected().await;
    let store = h.dispatcher.store().clone();
    let Harness {
        remote,
        manager: _manager,
        dispatcher,
    } = h;
    drop(dispatcher);

    remote.push(&Envelope::new(
        event::EPIC_UPDATED,
        json!({ "id": "GA-1", "currentState": "queued_for_planning" }),
    ));
    settle().await;
    assert!(store.is_empty());
}

#[parameterized(
    rejected = { DispatchError::Rejected(Rejection::UnknownAction("x".into())), "rejected (unknown-action): unknown action: 'x'" },
    unknown = { DispatchError::UnknownEpic("GA-1".into()), "unknown epic: GA-1" },
    exists = { DispatchError::AlreadyExists("GA-1".into()), "epic already exists: GA-1" },
)]
fn dispatch_error_display(err: DispatchError, expected: &str) {
    assert_eq!(err.to_string(), expected);
}
