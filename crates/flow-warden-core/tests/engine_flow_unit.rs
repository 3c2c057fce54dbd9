// crates/flow-warden-core/tests/engine_flow_unit.rs
// ============================================================================
// Module: Engine Flow Tests
// Description: End-to-end phase machine scenarios over the in-memory store.
// ============================================================================
//! ## Overview
//! Validates the happy path, rollback, rework, illegal triggers, budget
//! halts, and duplicate flow creation against the workflow engine.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use flow_warden_core::AdvanceTrigger;
use flow_warden_core::BudgetGovernor;
use flow_warden_core::CostAction;
use flow_warden_core::CostDelta;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::FlowStatus;
use flow_warden_core::GateRegistry;
use flow_warden_core::InMemoryWorkflowStore;
use flow_warden_core::Phase;
use flow_warden_core::TriggerAction;
use flow_warden_core::WorkflowEngine;
use flow_warden_core::WorkflowStore;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn engine() -> WorkflowEngine {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    WorkflowEngine::new(store, GateRegistry::with_defaults())
}

fn advance_trigger() -> AdvanceTrigger {
    AdvanceTrigger { action: TriggerAction::Advance, actor: "operator".to_string() }
}

fn trigger(action: TriggerAction) -> AdvanceTrigger {
    AdvanceTrigger { action, actor: "operator".to_string() }
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[test]
fn six_advances_complete_the_flow() {
    let engine = engine();
    let flow_id = FlowId::new("t1");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");

    let expected = [
        Phase::Planning,
        Phase::Implementation,
        Phase::Verification,
        Phase::Review,
        Phase::Consensus,
        Phase::Complete,
    ];
    for target in expected {
        let outcome = engine.advance(&flow_id, &advance_trigger()).expect("advance");
        assert_eq!(outcome.to, target);
    }

    let state = engine.get_flow(&flow_id).expect("load");
    assert_eq!(state.current_phase, Phase::Complete);
    assert_eq!(state.status, FlowStatus::Completed);
    assert_eq!(state.round, 0);
    assert_eq!(state.last_event_seq, 7);

    let events = engine.store().list_events_since(&flow_id, 0).expect("events");
    assert_eq!(events.len(), 7);
    let seqs: Vec<u64> = events.iter().map(|event| event.seq_no).collect();
    assert_eq!(seqs, (1..=7).collect::<Vec<u64>>());
    assert_eq!(events[0].event_type, "flow_started");
    for event in &events[1..] {
        assert_eq!(event.event_type, "phase_transition");
        assert!(event.verify_payload_hash());
    }
}

#[test]
fn every_target_phase_has_a_snapshot() {
    let engine = engine();
    let flow_id = FlowId::new("snap");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");
    for _ in 0..6 {
        engine.advance(&flow_id, &advance_trigger()).expect("advance");
    }
    for phase in [
        Phase::Planning,
        Phase::Implementation,
        Phase::Verification,
        Phase::Review,
        Phase::Consensus,
        Phase::Complete,
    ] {
        let snapshot = engine.store().latest_snapshot(&flow_id, phase).expect("read");
        assert!(snapshot.is_some(), "missing snapshot for {phase}");
    }
    assert!(
        engine.store().latest_snapshot(&flow_id, Phase::Intake).expect("read").is_none(),
        "no snapshot is captured for the starting phase"
    );
}

#[test]
fn completed_flow_rejects_further_triggers() {
    let engine = engine();
    let flow_id = FlowId::new("done");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");
    for _ in 0..6 {
        engine.advance(&flow_id, &advance_trigger()).expect("advance");
    }
    let err = engine.advance(&flow_id, &advance_trigger()).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::FlowAlreadyDone);
}

// ============================================================================
// SECTION: Back-Edges
// ============================================================================

#[test]
fn rollback_at_verification_returns_to_implementation() {
    let engine = engine();
    let flow_id = FlowId::new("t-rollback");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");
    for _ in 0..3 {
        engine.advance(&flow_id, &advance_trigger()).expect("advance");
    }

    let outcome = engine.advance(&flow_id, &trigger(TriggerAction::Rollback)).expect("rollback");
    assert_eq!(outcome.from, Phase::Verification);
    assert_eq!(outcome.to, Phase::Implementation);

    let state = engine.get_flow(&flow_id).expect("load");
    assert_eq!(state.current_phase, Phase::Implementation);
    assert_eq!(state.round, 1);
    assert_eq!(state.status, FlowStatus::Running);
    assert_eq!(engine.store().list_events_since(&flow_id, 0).expect("events").len(), 5);

    // The flow keeps moving after the rollback.
    let outcome = engine.advance(&flow_id, &advance_trigger()).expect("advance");
    assert_eq!(outcome.to, Phase::Verification);
}

#[test]
fn rework_at_consensus_returns_to_review() {
    let engine = engine();
    let flow_id = FlowId::new("t-rework");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");
    for _ in 0..5 {
        engine.advance(&flow_id, &advance_trigger()).expect("advance");
    }

    let outcome = engine.advance(&flow_id, &trigger(TriggerAction::Rework)).expect("rework");
    assert_eq!(outcome.from, Phase::Consensus);
    assert_eq!(outcome.to, Phase::Review);

    let state = engine.get_flow(&flow_id).expect("load");
    assert_eq!(state.current_phase, Phase::Review);
    assert_eq!(state.round, 1);
}

#[test]
fn rework_outside_consensus_is_rejected_without_state_change() {
    let engine = engine();
    let flow_id = FlowId::new("t-illegal");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");
    for _ in 0..3 {
        engine.advance(&flow_id, &advance_trigger()).expect("advance");
    }

    let before = engine.get_flow(&flow_id).expect("load");
    let err = engine.advance(&flow_id, &trigger(TriggerAction::Rework)).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::InvalidTransition);
    let after = engine.get_flow(&flow_id).expect("load");
    assert_eq!(before, after);
}

#[test]
fn rollback_outside_verification_is_rejected() {
    let engine = engine();
    let flow_id = FlowId::new("t-rollback-bad");
    engine.start_flow(flow_id.clone(), 100.0).expect("start");
    let err =
        engine.advance(&flow_id, &trigger(TriggerAction::Rollback)).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

// ============================================================================
// SECTION: Budget Halt
// ============================================================================

#[test]
fn budget_halt_blocks_the_next_advance() {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let engine = WorkflowEngine::new(Arc::clone(&store), GateRegistry::with_defaults());
    let governor = BudgetGovernor::new(store);
    let flow_id = FlowId::new("t2");
    engine.start_flow(flow_id.clone(), 10.0).expect("start");

    let delta = CostDelta { amount_usd: 10.0, ..CostDelta::default() };
    let action = governor.record_usage(&flow_id, &delta).expect("record");
    assert_eq!(action, CostAction::Halt);

    let err = engine.advance(&flow_id, &advance_trigger()).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::PhaseGateFailed);
    assert!(
        err.blockers.iter().any(|blocker| blocker.contains("budget limit exceeded")),
        "missing budget blocker: {:?}",
        err.blockers
    );
}

// ============================================================================
// SECTION: Duplicate Creation
// ============================================================================

#[test]
fn duplicate_start_flow_fails_and_preserves_state() {
    let engine = engine();
    let flow_id = FlowId::new("dup");
    engine.start_flow(flow_id.clone(), 50.0).expect("start");
    engine.advance(&flow_id, &advance_trigger()).expect("advance");

    let err = engine.start_flow(flow_id.clone(), 99.0).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::DuplicateTask);

    let state = engine.get_flow(&flow_id).expect("load");
    assert_eq!(state.current_phase, Phase::Planning);
    assert!((state.budget_cap - 50.0).abs() < f64::EPSILON);
}

// ============================================================================
// SECTION: Gate Registration
// ============================================================================

#[test]
fn missing_gate_fails_closed() {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let engine = WorkflowEngine::new(store, GateRegistry::new());
    let flow_id = FlowId::new("no-gate");
    engine.start_flow(flow_id.clone(), 10.0).expect("start");
    let err = engine.advance(&flow_id, &advance_trigger()).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::GateNotRegistered);
}

// ============================================================================
// SECTION: Optimistic Locking
// ============================================================================

#[test]
fn stale_version_update_surfaces_optimistic_lock() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let engine =
        WorkflowEngine::new(Arc::clone(&store) as Arc<dyn WorkflowStore>, GateRegistry::with_defaults());
    let flow_id = FlowId::new("race");
    let initial = engine.start_flow(flow_id.clone(), 10.0).expect("start");

    // A concurrent writer bumps the version first.
    let mut winner = initial.clone();
    winner.state_version += 1;
    store.update_flow(initial.state_version, &winner).expect("winner commits");

    let mut loser = initial;
    loser.state_version += 1;
    let err = store.update_flow(1, &loser).expect_err("loser must fail");
    assert_eq!(err.code, ErrorCode::OptimisticLock);
}
