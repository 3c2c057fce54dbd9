// crates/flow-warden-workers/tests/worker_lifecycle_unit.rs
// ============================================================================
// Module: Worker Lifecycle Tests
// Description: Spawn limits, terminal guards, replacement, and timeouts.
// ============================================================================
//! ## Overview
//! Validates the worker limit, the terminal-state guard, replacement spec
//! cloning, heartbeat refresh, and the soft/hard timeout sweep.

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
use flow_warden_core::InMemoryWorkflowStore;
use flow_warden_core::Phase;
use flow_warden_core::WorkerState;
use flow_warden_core::WorkflowStore;
use flow_warden_workers::Supervisor;
use flow_warden_workers::TimeoutKind;
use flow_warden_workers::WorkerManager;
use flow_warden_workers::WorkerSpec;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const NOW: i64 = 1_700_000_000;

fn spec(flow: &str) -> WorkerSpec {
    WorkerSpec {
        flow_id: FlowId::new(flow),
        phase: Phase::Implementation,
        role: "builder".to_string(),
        files: vec!["src/main.rs".to_string()],
        soft_timeout_sec: 20,
        hard_timeout_sec: 30,
    }
}

fn manager_with_store(max: usize) -> (Arc<WorkerManager>, Arc<InMemoryWorkflowStore>) {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let manager =
        Arc::new(WorkerManager::new(Arc::clone(&store) as Arc<dyn WorkflowStore>, max));
    (manager, store)
}

fn supervisor_over(
    manager: &Arc<WorkerManager>,
    store: &Arc<InMemoryWorkflowStore>,
) -> Supervisor {
    Supervisor::new(
        Arc::clone(store) as Arc<dyn WorkflowStore>,
        Arc::clone(manager),
        10,
        &CancellationToken::new(),
    )
}

// ============================================================================
// SECTION: Spawn and Limits
// ============================================================================

#[test]
fn spawn_mints_sequenced_ids_and_audits() {
    let (manager, store) = manager_with_store(4);
    let first = manager.spawn(&spec("t1"), NOW).expect("spawn");
    let second = manager.spawn(&spec("t1"), NOW).expect("spawn");
    assert!(first.worker_id.as_str().starts_with("w-"));
    assert_ne!(first.worker_id, second.worker_id);
    assert_eq!(first.state, WorkerState::Created);
    assert_eq!(first.last_heartbeat, NOW);

    let audits = store.list_audit(&FlowId::new("t1")).expect("audit");
    assert_eq!(
        audits.iter().filter(|record| record.kind == "worker_spawned").count(),
        2
    );
}

#[test]
fn spawn_fails_once_the_active_limit_is_reached() {
    let (manager, _store) = manager_with_store(2);
    manager.spawn(&spec("t1"), NOW).expect("spawn");
    manager.spawn(&spec("t1"), NOW).expect("spawn");
    let err = manager.spawn(&spec("t1"), NOW).expect_err("limit");
    assert_eq!(err.code, ErrorCode::WorkerLimitReached);
}

#[test]
fn finished_workers_free_their_limit_slot() {
    let (manager, _store) = manager_with_store(1);
    let worker = manager.spawn(&spec("t1"), NOW).expect("spawn");
    manager.shutdown(&worker.worker_id, NOW).expect("shutdown");
    manager.spawn(&spec("t1"), NOW).expect("slot is free again");
}

// ============================================================================
// SECTION: Terminal Guard
// ============================================================================

#[test]
fn terminal_states_cannot_be_left() {
    let (manager, _store) = manager_with_store(4);
    let worker = manager.spawn(&spec("t1"), NOW).expect("spawn");
    manager.shutdown(&worker.worker_id, NOW).expect("shutdown");

    let err = manager
        .update_state(&worker.worker_id, WorkerState::Running)
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::WorkerAlreadyDone);

    let err = manager.shutdown(&worker.worker_id, NOW).expect_err("second shutdown");
    assert_eq!(err.code, ErrorCode::WorkerAlreadyDone);
}

#[test]
fn update_state_moves_created_to_running() {
    let (manager, _store) = manager_with_store(4);
    let worker = manager.spawn(&spec("t1"), NOW).expect("spawn");
    let updated = manager.update_state(&worker.worker_id, WorkerState::Running).expect("update");
    assert_eq!(updated.state, WorkerState::Running);
}

// ============================================================================
// SECTION: Replacement
// ============================================================================

#[test]
fn replace_retires_the_old_worker_and_clones_its_spec() {
    let (manager, store) = manager_with_store(4);
    let old = manager.spawn(&spec("t1"), NOW).expect("spawn");
    let fresh = manager.replace(&old.worker_id, NOW + 5).expect("replace");

    let retired = store.get_worker(&old.worker_id).expect("load old");
    assert_eq!(retired.state, WorkerState::Replaced);
    assert_eq!(fresh.role, old.role);
    assert_eq!(fresh.file_ownership, old.file_ownership);
    assert_eq!(fresh.soft_timeout_sec, old.soft_timeout_sec);
    assert_eq!(fresh.hard_timeout_sec, old.hard_timeout_sec);
    assert_eq!(fresh.state, WorkerState::Created);
    assert_ne!(fresh.worker_id, old.worker_id);
}

// ============================================================================
// SECTION: Timeout Sweep
// ============================================================================

#[test]
fn hard_timeout_retires_and_replaces_in_one_pass() {
    let (manager, store) = manager_with_store(4);
    let supervisor = supervisor_over(&manager, &store);
    let worker = manager.spawn(&spec("t1"), NOW).expect("spawn");

    let actions = supervisor.check_timeouts(&FlowId::new("t1"), NOW + 35).expect("sweep");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, TimeoutKind::Hard);
    assert_eq!(actions[0].worker_id, worker.worker_id);
    let replacement_id = actions[0].replacement.clone().expect("replacement");

    let retired = store.get_worker(&worker.worker_id).expect("load");
    assert_eq!(retired.state, WorkerState::HardTimeout);

    let replacement = store.get_worker(&replacement_id).expect("load replacement");
    assert_eq!(replacement.role, worker.role);
    assert_eq!(replacement.file_ownership, worker.file_ownership);

    let audits = store.list_audit(&FlowId::new("t1")).expect("audit");
    assert!(audits.iter().any(|record| record.kind == "hard_timeout"));
}

#[test]
fn soft_timeout_flags_without_replacing() {
    let (manager, store) = manager_with_store(4);
    let supervisor = supervisor_over(&manager, &store);
    let worker = manager.spawn(&spec("t1"), NOW).expect("spawn");

    let actions = supervisor.check_timeouts(&FlowId::new("t1"), NOW + 25).expect("sweep");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, TimeoutKind::Soft);
    assert!(actions[0].replacement.is_none());
    let flagged = store.get_worker(&worker.worker_id).expect("load");
    assert_eq!(flagged.state, WorkerState::SoftTimeout);

    // A second sweep at the same age does not re-flag.
    let actions = supervisor.check_timeouts(&FlowId::new("t1"), NOW + 26).expect("sweep");
    assert!(actions.is_empty());

    // Without fresh heartbeats the hard deadline still fires later.
    let actions = supervisor.check_timeouts(&FlowId::new("t1"), NOW + 40).expect("sweep");
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, TimeoutKind::Hard);
}

#[test]
fn heartbeat_refresh_prevents_timeouts() {
    let (manager, store) = manager_with_store(4);
    let supervisor = supervisor_over(&manager, &store);
    let worker = manager.spawn(&spec("t1"), NOW).expect("spawn");

    supervisor.heartbeat(&worker.worker_id, NOW + 25).expect("heartbeat");
    let actions = supervisor.check_timeouts(&FlowId::new("t1"), NOW + 35).expect("sweep");
    assert!(actions.is_empty(), "fresh heartbeat must clear both deadlines: {actions:?}");
}

#[test]
fn zero_deadlines_disable_timeouts() {
    let (manager, store) = manager_with_store(4);
    let supervisor = supervisor_over(&manager, &store);
    let mut disabled = spec("t1");
    disabled.soft_timeout_sec = 0;
    disabled.hard_timeout_sec = 0;
    manager.spawn(&disabled, NOW).expect("spawn");

    let actions = supervisor
        .check_timeouts(&FlowId::new("t1"), NOW + 1_000_000)
        .expect("sweep");
    assert!(actions.is_empty());
}

#[test]
fn unknown_worker_heartbeat_fails() {
    let (manager, store) = manager_with_store(4);
    let supervisor = supervisor_over(&manager, &store);
    let err = supervisor
        .heartbeat(&flow_warden_core::WorkerId::new("w-404"), NOW)
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::WorkerNotFound);
}

// ============================================================================
// SECTION: Monitoring Loop Shutdown
// ============================================================================

#[tokio::test]
async fn stop_monitoring_is_idempotent() {
    let (manager, store) = manager_with_store(4);
    let supervisor = Arc::new(supervisor_over(&manager, &store));
    supervisor.start_monitoring(FlowId::new("t1"));
    supervisor.stop_monitoring();
    supervisor.stop_monitoring();
    // The loop observes the cancelled token and exits without panicking.
    tokio::task::yield_now().await;
}
