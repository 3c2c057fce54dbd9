// crates/flow-warden-workers/src/manager.rs
// ============================================================================
// Module: Worker Manager
// Description: Spawn, state transitions, replacement, and shutdown.
// Purpose: Own the worker lifecycle and the terminal-state guard.
// Dependencies: flow-warden-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The manager mints worker ids from a process-wide sequence, enforces the
//! per-flow active worker limit, and guards terminal states: `done`,
//! `replaced`, and `hard_timeout` are never left. Replacement clones the
//! old worker's spec (role, ownership, deadlines) into a fresh worker.
//! Every lifecycle decision is audited; audit failures degrade silently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use flow_warden_core::AuditRecord;
use flow_warden_core::AuditSeverity;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::Phase;
use flow_warden_core::WorkerId;
use flow_warden_core::WorkerRecord;
use flow_warden_core::WorkerState;
use flow_warden_core::WorkflowStore;
use flow_warden_core::now_nanos;
use serde_json::json;

// ============================================================================
// SECTION: Worker Spec
// ============================================================================

/// Caller-supplied description of a worker to spawn.
///
/// # Invariants
/// - `files` become the worker's advisory ownership list, order preserved.
/// - Timeouts of zero disable the corresponding deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Flow the worker belongs to.
    pub flow_id: FlowId,
    /// Phase the worker is spawned for.
    pub phase: Phase,
    /// Provider role the worker runs as.
    pub role: String,
    /// Files the worker may reserve.
    pub files: Vec<String>,
    /// Soft deadline in seconds since the last heartbeat.
    pub soft_timeout_sec: i64,
    /// Hard deadline in seconds since the last heartbeat.
    pub hard_timeout_sec: i64,
}

/// Process-wide sequence for worker identifier minting.
static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// SECTION: Worker Manager
// ============================================================================

/// Worker lifecycle owner.
///
/// # Invariants
/// - Active workers per flow never exceed `max_workers`.
/// - Terminal states are never left.
pub struct WorkerManager {
    /// Persistence backend.
    store: Arc<dyn WorkflowStore>,
    /// Maximum concurrently active workers per flow.
    max_workers: usize,
}

impl WorkerManager {
    /// Creates a manager over the store with a per-flow worker limit.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, max_workers: usize) -> Self {
        Self { store, max_workers }
    }

    /// Returns the manager's store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn WorkflowStore> {
        Arc::clone(&self.store)
    }

    /// Spawns a worker from a spec at wall-clock `now`.
    ///
    /// # Errors
    ///
    /// Returns `worker_limit_reached` when the flow already has
    /// `max_workers` active workers, or a store error on write failure.
    pub fn spawn(&self, spec: &WorkerSpec, now: i64) -> Result<WorkerRecord, EngineError> {
        let active = self
            .store
            .list_workers(&spec.flow_id)?
            .iter()
            .filter(|worker| worker.state.is_active())
            .count();
        if active >= self.max_workers {
            return Err(EngineError::new(
                ErrorCode::WorkerLimitReached,
                format!(
                    "flow {} already has {active} active workers (limit {})",
                    spec.flow_id, self.max_workers
                ),
            ));
        }
        let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
        let worker = WorkerRecord {
            worker_id: WorkerId::new(format!("w-{}-{seq}", now_nanos())),
            flow_id: spec.flow_id.clone(),
            phase: spec.phase,
            role: spec.role.clone(),
            state: WorkerState::Created,
            file_ownership: spec.files.clone(),
            soft_timeout_sec: spec.soft_timeout_sec,
            hard_timeout_sec: spec.hard_timeout_sec,
            last_heartbeat: now,
            created_at: now,
        };
        self.store.insert_worker(&worker)?;
        self.audit(
            &spec.flow_id,
            "worker_spawned",
            AuditSeverity::Info,
            json!({ "worker_id": worker.worker_id.as_str(), "role": worker.role }),
            now,
        );
        Ok(worker)
    }

    /// Moves a worker to a new lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns `worker_already_done` when the current state is terminal and
    /// `worker_not_found` for unknown ids.
    pub fn update_state(
        &self,
        worker_id: &WorkerId,
        new_state: WorkerState,
    ) -> Result<WorkerRecord, EngineError> {
        let mut worker = self.store.get_worker(worker_id)?;
        if worker.state.is_terminal() {
            return Err(EngineError::new(
                ErrorCode::WorkerAlreadyDone,
                format!("worker {worker_id} is {} and cannot change state", worker.state.as_str()),
            ));
        }
        worker.state = new_state;
        self.store.update_worker(&worker)?;
        Ok(worker)
    }

    /// Replaces a worker: retires the old record and spawns a fresh worker
    /// with the same role, ownership, and deadlines.
    ///
    /// A worker already in a terminal state (a hard timeout, typically) is
    /// left in that state; only the replacement is spawned.
    ///
    /// # Errors
    ///
    /// Returns `worker_not_found` for unknown ids, `worker_limit_reached`
    /// when the replacement would exceed the limit, or a store error.
    pub fn replace(&self, worker_id: &WorkerId, now: i64) -> Result<WorkerRecord, EngineError> {
        let mut old = self.store.get_worker(worker_id)?;
        if !old.state.is_terminal() {
            old.state = WorkerState::Replaced;
            self.store.update_worker(&old)?;
        }
        let spec = WorkerSpec {
            flow_id: old.flow_id.clone(),
            phase: old.phase,
            role: old.role.clone(),
            files: old.file_ownership.clone(),
            soft_timeout_sec: old.soft_timeout_sec,
            hard_timeout_sec: old.hard_timeout_sec,
        };
        let replacement = self.spawn(&spec, now)?;
        self.audit(
            &old.flow_id,
            "worker_replaced",
            AuditSeverity::Info,
            json!({
                "old_worker_id": worker_id.as_str(),
                "new_worker_id": replacement.worker_id.as_str(),
            }),
            now,
        );
        Ok(replacement)
    }

    /// Shuts a worker down cleanly.
    ///
    /// # Errors
    ///
    /// Returns `worker_already_done` for terminal workers and
    /// `worker_not_found` for unknown ids.
    pub fn shutdown(&self, worker_id: &WorkerId, now: i64) -> Result<(), EngineError> {
        let worker = self.update_state(worker_id, WorkerState::Done)?;
        self.audit(
            &worker.flow_id,
            "worker_shutdown",
            AuditSeverity::Info,
            json!({ "worker_id": worker_id.as_str() }),
            now,
        );
        Ok(())
    }

    /// Writes an audit record, degrading silently on failure.
    fn audit(
        &self,
        flow_id: &FlowId,
        kind: &str,
        severity: AuditSeverity,
        detail: serde_json::Value,
        now: i64,
    ) {
        let record = AuditRecord::new(flow_id.clone(), kind, severity, detail, now);
        if self.store.record_audit(&record).is_err() {
            tracing::warn!(flow = %flow_id, kind, "audit write failed");
        }
    }
}
