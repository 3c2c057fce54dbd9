// crates/flow-warden-workers/tests/intent_locks_unit.rs
// ============================================================================
// Module: Intent Lock Tests
// Description: Lease acquisition, ownership, expiry, and conflicts.
// ============================================================================
//! ## Overview
//! Validates single-holder semantics per file, advisory ownership checks,
//! lease expiry (including the zero-grace lease), pre-image verification,
//! and pairwise conflict classification.

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
use flow_warden_core::IntentId;
use flow_warden_core::IntentOperation;
use flow_warden_core::IntentRecord;
use flow_warden_core::IntentStatus;
use flow_warden_core::Phase;
use flow_warden_core::WorkerId;
use flow_warden_core::WorkerRecord;
use flow_warden_core::WorkerState;
use flow_warden_core::WorkflowStore;
use flow_warden_workers::ConflictDetector;
use flow_warden_workers::ConflictKind;
use flow_warden_workers::IntentResolver;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const NOW: i64 = 1_700_000_000;

fn worker(flow: &str, id: &str, files: &[&str]) -> WorkerRecord {
    WorkerRecord {
        worker_id: WorkerId::new(id),
        flow_id: FlowId::new(flow),
        phase: Phase::Implementation,
        role: "builder".to_string(),
        state: WorkerState::Running,
        file_ownership: files.iter().map(ToString::to_string).collect(),
        soft_timeout_sec: 60,
        hard_timeout_sec: 300,
        last_heartbeat: NOW,
        created_at: NOW,
    }
}

fn intent(flow: &str, worker_id: &str, id: &str, file: &str) -> IntentRecord {
    IntentRecord {
        intent_id: IntentId::new(id),
        flow_id: FlowId::new(flow),
        worker_id: WorkerId::new(worker_id),
        target_file: file.to_string(),
        operation: IntentOperation::Write,
        status: IntentStatus::Pending,
        pre_hash: "before".to_string(),
        post_hash: String::new(),
        payload_hash: "payload".to_string(),
        lease_until: 0,
    }
}

fn harness() -> (IntentResolver, ConflictDetector, Arc<InMemoryWorkflowStore>) {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let resolver = IntentResolver::new(Arc::clone(&store) as Arc<dyn WorkflowStore>);
    let detector = ConflictDetector::new(Arc::clone(&store) as Arc<dyn WorkflowStore>);
    (resolver, detector, store)
}

// ============================================================================
// SECTION: Acquisition
// ============================================================================

#[test]
fn second_intent_on_a_held_file_conflicts_until_release() {
    let (resolver, _detector, store) = harness();
    store.insert_worker(&worker("t1", "w-1", &["main.go"])).expect("w1");
    store.insert_worker(&worker("t1", "w-2", &["main.go"])).expect("w2");

    resolver.acquire_lock(&intent("t1", "w-1", "i-1", "main.go"), 600, NOW).expect("i1");

    let err = resolver
        .acquire_lock(&intent("t1", "w-2", "i-2", "main.go"), 600, NOW)
        .expect_err("held");
    assert_eq!(err.code, ErrorCode::IntentConflict);

    resolver.release_lock(&IntentId::new("i-1"), NOW).expect("release");
    resolver.acquire_lock(&intent("t1", "w-2", "i-2", "main.go"), 600, NOW).expect("i2");

    let audits = store.list_audit(&FlowId::new("t1")).expect("audit");
    let kinds: Vec<&str> = audits.iter().map(|record| record.kind.as_str()).collect();
    assert_eq!(kinds, vec!["lock_acquired", "lock_released", "lock_acquired"]);
}

#[test]
fn ownership_is_checked_after_the_holder_lookup() {
    let (resolver, _detector, store) = harness();
    store.insert_worker(&worker("t1", "w-1", &["src/lib.rs"])).expect("w1");
    let err = resolver
        .acquire_lock(&intent("t1", "w-1", "i-1", "src/main.rs"), 600, NOW)
        .expect_err("not owned");
    assert_eq!(err.code, ErrorCode::FileOwnership);
}

#[test]
fn acquisition_sets_pending_status_and_lease() {
    let (resolver, _detector, store) = harness();
    store.insert_worker(&worker("t1", "w-1", &["src/lib.rs"])).expect("w1");
    let granted = resolver
        .acquire_lock(&intent("t1", "w-1", "i-1", "src/lib.rs"), 600, NOW)
        .expect("grant");
    assert_eq!(granted.status, IntentStatus::Pending);
    assert_eq!(granted.lease_until, NOW + 600);
    let stored = store.get_intent(&IntentId::new("i-1")).expect("load");
    assert_eq!(stored, granted);
}

// ============================================================================
// SECTION: Execution
// ============================================================================

#[test]
fn execute_verifies_lease_and_pre_image() {
    let (resolver, _detector, store) = harness();
    store.insert_worker(&worker("t1", "w-1", &["src/lib.rs"])).expect("w1");
    resolver.acquire_lock(&intent("t1", "w-1", "i-1", "src/lib.rs"), 600, NOW).expect("grant");

    let err = resolver
        .execute(&IntentId::new("i-1"), "tampered", "after", NOW + 1)
        .expect_err("pre-image changed");
    assert_eq!(err.code, ErrorCode::IntentHashMismatch);

    resolver.execute(&IntentId::new("i-1"), "before", "after", NOW + 1).expect("execute");
    let done = store.get_intent(&IntentId::new("i-1")).expect("load");
    assert_eq!(done.status, IntentStatus::Done);
    assert_eq!(done.post_hash, "after");
}

#[test]
fn zero_duration_lease_means_no_grace() {
    let (resolver, _detector, store) = harness();
    store.insert_worker(&worker("t1", "w-1", &["src/lib.rs"])).expect("w1");
    resolver.acquire_lock(&intent("t1", "w-1", "i-1", "src/lib.rs"), 0, NOW).expect("grant");

    let err = resolver
        .execute(&IntentId::new("i-1"), "before", "after", NOW + 1)
        .expect_err("already expired");
    assert_eq!(err.code, ErrorCode::LeaseExpired);
}

#[test]
fn expired_lease_rejects_execution() {
    let (resolver, _detector, store) = harness();
    store.insert_worker(&worker("t1", "w-1", &["src/lib.rs"])).expect("w1");
    resolver.acquire_lock(&intent("t1", "w-1", "i-1", "src/lib.rs"), 60, NOW).expect("grant");
    let err = resolver
        .execute(&IntentId::new("i-1"), "before", "after", NOW + 61)
        .expect_err("expired");
    assert_eq!(err.code, ErrorCode::LeaseExpired);
}

#[test]
fn unknown_intent_surfaces_intent_not_found() {
    let (resolver, _detector, _store) = harness();
    let err = resolver
        .execute(&IntentId::new("i-404"), "x", "y", NOW)
        .expect_err("must fail");
    assert_eq!(err.code, ErrorCode::IntentNotFound);
}

// ============================================================================
// SECTION: Conflict Detection
// ============================================================================

#[test]
fn pairwise_conflicts_classify_delete_create_overlap() {
    let (_resolver, detector, store) = harness();
    let mut delete = intent("t1", "w-1", "i-del", "shared.rs");
    delete.operation = IntentOperation::Delete;
    let mut create_a = intent("t1", "w-1", "i-ca", "fresh.rs");
    create_a.operation = IntentOperation::Create;
    let mut create_b = intent("t1", "w-2", "i-cb", "fresh.rs");
    create_b.operation = IntentOperation::Create;
    let write = intent("t1", "w-2", "i-w", "shared.rs");

    for record in [&delete, &create_a, &create_b, &write] {
        store.upsert_intent(record).expect("seed");
    }

    let conflicts = detector.detect(&FlowId::new("t1")).expect("detect");
    assert_eq!(conflicts.len(), 2);

    let fresh = conflicts
        .iter()
        .find(|conflict| conflict.target_file == "fresh.rs")
        .expect("fresh conflict");
    assert_eq!(fresh.kind, ConflictKind::Create);

    let shared = conflicts
        .iter()
        .find(|conflict| conflict.target_file == "shared.rs")
        .expect("shared conflict");
    assert_eq!(shared.kind, ConflictKind::Delete);
}

#[test]
fn terminal_intents_do_not_conflict() {
    let (_resolver, detector, store) = harness();
    let mut done = intent("t1", "w-1", "i-1", "shared.rs");
    done.status = IntentStatus::Done;
    store.upsert_intent(&done).expect("seed");
    store.upsert_intent(&intent("t1", "w-2", "i-2", "shared.rs")).expect("seed");

    let conflicts = detector.detect(&FlowId::new("t1")).expect("detect");
    assert!(conflicts.is_empty());
}

#[test]
fn resolve_always_escalates() {
    let (_resolver, detector, store) = harness();
    store.upsert_intent(&intent("t1", "w-1", "i-1", "shared.rs")).expect("seed");
    store.upsert_intent(&intent("t1", "w-2", "i-2", "shared.rs")).expect("seed");
    let conflicts = detector.detect(&FlowId::new("t1")).expect("detect");
    let err = detector.resolve(&conflicts[0]).expect_err("must escalate");
    assert_eq!(err.code, ErrorCode::IntentConflict);
}
