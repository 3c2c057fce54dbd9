// crates/flow-warden-core/tests/gates_governor_unit.rs
// ============================================================================
// Module: Gate and Governor Tests
// Description: Budget threshold boundaries and gate composition behavior.
// ============================================================================
//! ## Overview
//! Validates the governor's warn/halt boundaries, the compaction gate's
//! short-circuit contract, the review gate, and composite aggregation order.

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
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use flow_warden_core::CompactionGate;
use flow_warden_core::CompactionSlots;
use flow_warden_core::CompositeGate;
use flow_warden_core::CostAction;
use flow_warden_core::DefaultGate;
use flow_warden_core::FlowId;
use flow_warden_core::FlowState;
use flow_warden_core::FlowStatus;
use flow_warden_core::Gate;
use flow_warden_core::GateDecision;
use flow_warden_core::ReviewGate;
use flow_warden_core::runtime::governor;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn running_state() -> FlowState {
    FlowState::initial(FlowId::new("gate-test"), 100.0, 0)
}

fn filled_slots() -> CompactionSlots {
    CompactionSlots {
        task_spec: "build the widget".to_string(),
        acceptance_criteria: "widget passes review".to_string(),
        current_phase: "planning".to_string(),
        artifact_refs: "artifacts/widget-plan.md".to_string(),
        ..CompactionSlots::default()
    }
}

/// Gate that always blocks with a fixed reason.
struct BlockingGate;

impl Gate for BlockingGate {
    fn name(&self) -> &str {
        "blocking"
    }

    fn evaluate(&self, _state: &FlowState) -> GateDecision {
        GateDecision::block(vec!["always blocked".to_string()])
    }
}

// ============================================================================
// SECTION: Governor Boundaries
// ============================================================================

#[test]
fn spend_at_cap_halts() {
    assert_eq!(governor::evaluate(100.0, 100.0), CostAction::Halt);
}

#[test]
fn spend_at_warn_ratio_warns() {
    assert_eq!(governor::evaluate(80.0, 100.0), CostAction::Warn);
}

#[test]
fn zero_spend_continues() {
    assert_eq!(governor::evaluate(0.0, 100.0), CostAction::Continue);
}

#[test]
fn zero_cap_disables_the_budget() {
    assert_eq!(governor::evaluate(1_000_000.0, 0.0), CostAction::Continue);
    assert_eq!(governor::evaluate(1.0, -5.0), CostAction::Continue);
}

#[test]
fn spend_past_cap_halts() {
    assert_eq!(governor::evaluate(150.0, 100.0), CostAction::Halt);
}

// ============================================================================
// SECTION: Default Gate
// ============================================================================

#[test]
fn default_gate_allows_running_flows_within_budget() {
    let decision = DefaultGate.evaluate(&running_state());
    assert!(decision.allow);
    assert!(decision.blockers.is_empty());
}

#[test]
fn default_gate_blocks_non_running_flows() {
    let mut state = running_state();
    state.status = FlowStatus::Blocked;
    let decision = DefaultGate.evaluate(&state);
    assert!(!decision.allow);
    assert!(decision.blockers.iter().any(|blocker| blocker.contains("blocked")));
}

#[test]
fn default_gate_blocks_on_budget_halt() {
    let mut state = running_state();
    state.budget_used = state.budget_cap;
    let decision = DefaultGate.evaluate(&state);
    assert!(!decision.allow);
    assert!(decision.blockers.iter().any(|blocker| blocker.contains("budget")));
}

// ============================================================================
// SECTION: Compaction Gate
// ============================================================================

#[test]
fn compaction_gate_allows_with_filled_slots() {
    let gate = CompactionGate::new(Arc::new(DefaultGate), |_| filled_slots());
    assert!(gate.evaluate(&running_state()).allow);
}

#[test]
fn compaction_gate_reports_each_empty_mandatory_slot() {
    let gate = CompactionGate::new(Arc::new(DefaultGate), |_| CompactionSlots::default());
    let decision = gate.evaluate(&running_state());
    assert!(!decision.allow);
    assert_eq!(decision.blockers.len(), 4);
    for slot in CompactionSlots::MANDATORY {
        assert!(
            decision.blockers.iter().any(|blocker| blocker.contains(slot)),
            "missing violation for {slot}: {:?}",
            decision.blockers
        );
    }
}

#[test]
fn compaction_gate_short_circuits_when_inner_blocks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&calls);
    let gate = CompactionGate::new(Arc::new(BlockingGate), move |_| {
        observed.fetch_add(1, Ordering::SeqCst);
        filled_slots()
    });
    let decision = gate.evaluate(&running_state());
    assert!(!decision.allow);
    assert_eq!(decision.blockers, vec!["always blocked".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "slots_fn must not run");
}

// ============================================================================
// SECTION: Review Gate
// ============================================================================

#[test]
fn review_gate_blocks_on_unresolved_blockers() {
    let gate = ReviewGate::new(Arc::new(DefaultGate), |_| {
        vec!["reviewer primary reported security score 1".to_string()]
    });
    let decision = gate.evaluate(&running_state());
    assert!(!decision.allow);
    assert_eq!(decision.blockers.len(), 1);
}

#[test]
fn review_gate_short_circuits_when_inner_blocks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&calls);
    let gate = ReviewGate::new(Arc::new(BlockingGate), move |_| {
        observed.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    });
    assert!(!gate.evaluate(&running_state()).allow);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "blockers_fn must not run");
}

// ============================================================================
// SECTION: Composite Gate
// ============================================================================

#[test]
fn composite_gate_concatenates_blockers_in_child_order() {
    let review = ReviewGate::new(Arc::new(DefaultGate), |_| vec!["review pending".to_string()]);
    let gate = CompositeGate::new(vec![Arc::new(BlockingGate), Arc::new(review)]);
    let decision = gate.evaluate(&running_state());
    assert!(!decision.allow);
    assert_eq!(
        decision.blockers,
        vec!["always blocked".to_string(), "review pending".to_string()]
    );
}

#[test]
fn composite_gate_allows_when_all_children_allow() {
    let gate = CompositeGate::new(vec![Arc::new(DefaultGate), Arc::new(DefaultGate)]);
    assert!(gate.evaluate(&running_state()).allow);
}
