// crates/flow-warden-guard/tests/guard_unit.rs
// ============================================================================
// Module: Guard Unit Tests
// Description: Deny patterns, allowlists, rate windows, and check ordering.
// ============================================================================
//! ## Overview
//! Validates wildcard matching, default deny patterns, prefix/command
//! allowlists, the lazy-reset rate window, the round cap, and the fixed
//! check order of the composite guard.

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

use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::FlowState;
use flow_warden_core::InMemoryWorkflowStore;
use flow_warden_core::Phase;
use flow_warden_core::WorkflowEvent;
use flow_warden_core::WorkflowStore;
use flow_warden_guard::Guard;
use flow_warden_guard::GuardConfig;
use flow_warden_guard::PermissionBroker;
use flow_warden_guard::RateLimiter;
use flow_warden_guard::wildcard_matches;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store_with_flow(flow: &str, budget_used: f64, budget_cap: f64, round: u32) -> Arc<InMemoryWorkflowStore> {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let mut state = FlowState::initial(FlowId::new(flow), budget_cap, 0);
    state.budget_used = budget_used;
    state.round = round;
    let event = WorkflowEvent::new(
        FlowId::new(flow),
        1,
        Phase::Intake,
        "flow_started",
        json!({}),
        0,
    )
    .expect("event");
    store.insert_flow(&state, &event).expect("insert");
    store
}

fn guard_over(store: Arc<InMemoryWorkflowStore>, limit: u32, max_rounds: u32) -> Guard {
    Guard::new(store, GuardConfig { rate_limit_per_minute: limit, max_rounds })
}

// ============================================================================
// SECTION: Wildcard Matching
// ============================================================================

#[test]
fn wildcard_star_and_question_semantics() {
    assert!(wildcard_matches("*.key", "server.key"));
    assert!(wildcard_matches("*.key", ".key"));
    assert!(!wildcard_matches("*.key", "server.pem"));
    assert!(wildcard_matches(".git/*", ".git/config"));
    assert!(wildcard_matches(".git/*", ".git/hooks/pre-commit"));
    assert!(!wildcard_matches(".git/*", "src/.github"));
    assert!(wildcard_matches("file-?.rs", "file-a.rs"));
    assert!(!wildcard_matches("file-?.rs", "file-ab.rs"));
    assert!(wildcard_matches("*", "anything/at/all"));
    assert!(wildcard_matches("", ""));
    assert!(!wildcard_matches("", "x"));
}

// ============================================================================
// SECTION: Permission Broker
// ============================================================================

#[test]
fn default_deny_patterns_win_over_allowed_paths() {
    let store = store_with_flow("t1", 0.0, 100.0, 0);
    let broker = PermissionBroker::new(Arc::clone(&store) as Arc<dyn WorkflowStore>);
    let sheet = broker.build_capability_sheet(
        FlowId::new("t1"),
        vec!["workspace/".to_string()],
        vec!["cargo build".to_string()],
    );

    // .env denied by exact base-name match even under an allowed prefix.
    let err = broker
        .check_permission(&sheet, "workspace/.env", "cargo build")
        .expect_err("must deny");
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    // *.key denied by wildcard on the base name.
    let err = broker
        .check_permission(&sheet, "workspace/secrets/tls.key", "cargo build")
        .expect_err("must deny");
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    // Denials are audited with warning severity.
    let audits = store.list_audit(&FlowId::new("t1")).expect("audit");
    assert_eq!(audits.len(), 2);
    assert!(audits.iter().all(|record| record.kind == "permission_denied"));
}

#[test]
fn path_prefix_and_exact_command_are_required() {
    let store = store_with_flow("t1", 0.0, 100.0, 0);
    let broker = PermissionBroker::new(store as Arc<dyn WorkflowStore>);
    let sheet = broker.build_capability_sheet(
        FlowId::new("t1"),
        vec!["workspace/src/".to_string()],
        vec!["cargo test".to_string()],
    );

    broker
        .check_permission(&sheet, "workspace/src/lib.rs", "cargo test")
        .expect("allowed");

    let err = broker
        .check_permission(&sheet, "elsewhere/lib.rs", "cargo test")
        .expect_err("outside prefix");
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    let err = broker
        .check_permission(&sheet, "workspace/src/lib.rs", "cargo test --release")
        .expect_err("command is exact-match");
    assert_eq!(err.code, ErrorCode::PermissionDenied);
}

// ============================================================================
// SECTION: Rate Limiter
// ============================================================================

#[test]
fn limit_checks_pass_then_the_window_is_closed() {
    let limiter = RateLimiter::new(3);
    let flow = FlowId::new("t1");
    for _ in 0..3 {
        limiter.check(&flow, 100).expect("within limit");
    }
    let err = limiter.check(&flow, 130).expect_err("limit reached");
    assert_eq!(err.code, ErrorCode::RateLimitExceeded);
}

#[test]
fn window_resets_after_sixty_seconds() {
    let limiter = RateLimiter::new(1);
    let flow = FlowId::new("t1");
    limiter.check(&flow, 100).expect("first");
    limiter.check(&flow, 130).expect_err("window still open");
    limiter.check(&flow, 160).expect("window elapsed, reset to one");
    limiter.check(&flow, 161).expect_err("new window full");
}

#[test]
fn windows_are_tracked_per_flow() {
    let limiter = RateLimiter::new(1);
    limiter.check(&FlowId::new("a"), 100).expect("a");
    limiter.check(&FlowId::new("b"), 100).expect("b is independent");
}

// ============================================================================
// SECTION: Composite Guard
// ============================================================================

#[test]
fn budget_halt_is_reported_before_permission_problems() {
    let store = store_with_flow("t1", 100.0, 100.0, 0);
    let guard = guard_over(store, 10, 3);
    let sheet = guard.broker().build_capability_sheet(
        FlowId::new("t1"),
        vec!["workspace/".to_string()],
        vec!["cargo build".to_string()],
    );
    // The path would also be denied, but budget must win.
    let err = guard
        .check_all(&FlowId::new("t1"), "elsewhere/x", "rm -rf /", &sheet, 100)
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::BudgetExceeded);
}

#[test]
fn round_cap_is_the_last_check() {
    let store = store_with_flow("t1", 0.0, 100.0, 3);
    let guard = guard_over(store, 10, 3);
    let sheet = guard.broker().build_capability_sheet(
        FlowId::new("t1"),
        vec!["workspace/".to_string()],
        vec!["cargo build".to_string()],
    );
    let err = guard
        .check_all(&FlowId::new("t1"), "workspace/src/lib.rs", "cargo build", &sheet, 100)
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::MaxRoundsExceeded);
}

#[test]
fn clean_request_passes_all_checks() {
    let store = store_with_flow("t1", 10.0, 100.0, 0);
    let guard = guard_over(store, 10, 3);
    let sheet = guard.broker().build_capability_sheet(
        FlowId::new("t1"),
        vec!["workspace/".to_string()],
        vec!["cargo build".to_string()],
    );
    guard
        .check_all(&FlowId::new("t1"), "workspace/src/lib.rs", "cargo build", &sheet, 100)
        .expect("allowed");
}

#[test]
fn unknown_flow_surfaces_flow_not_found() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let guard = guard_over(store, 10, 3);
    let sheet = guard.broker().build_capability_sheet(
        FlowId::new("missing"),
        vec!["workspace/".to_string()],
        vec!["cargo build".to_string()],
    );
    let err = guard
        .check_all(&FlowId::new("missing"), "workspace/x", "cargo build", &sheet, 100)
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::FlowNotFound);
}
