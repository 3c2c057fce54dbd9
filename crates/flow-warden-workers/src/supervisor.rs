// crates/flow-warden-workers/src/supervisor.rs
// ============================================================================
// Module: Worker Supervisor
// Description: Heartbeats and soft/hard timeout detection loop.
// Purpose: Detect stalled workers and replace the hard-timed-out ones.
// Dependencies: flow-warden-core, crate::manager, tokio, tokio-util, tracing
// ============================================================================

//! ## Overview
//! The supervisor runs one background timer per flow. Each tick evaluates
//! every non-terminal worker's heartbeat age: past the hard deadline the
//! worker is retired and replaced in the same pass; past the soft deadline
//! it is flagged and left running. Both deadlines are evaluated
//! independently at every tick.
//!
//! Shutdown: `stop_monitoring` cancels a single internal token; the loop
//! exits at its next iteration or when the ambient cancellation fires.
//! Cancelling an already-cancelled token is a no-op, so stop is idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use flow_warden_core::AuditRecord;
use flow_warden_core::AuditSeverity;
use flow_warden_core::EngineError;
use flow_warden_core::FlowId;
use flow_warden_core::WorkerId;
use flow_warden_core::WorkerState;
use flow_warden_core::WorkflowStore;
use flow_warden_core::now_unix;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::manager::WorkerManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default supervision tick period in seconds.
pub const DEFAULT_CHECK_INTERVAL_SEC: u64 = 10;

// ============================================================================
// SECTION: Timeout Actions
// ============================================================================

/// Kind of deadline a worker missed.
///
/// # Invariants
/// - Variants are stable for audit payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Soft deadline missed; signaling only.
    Soft,
    /// Hard deadline missed; worker retired and replaced.
    Hard,
}

impl TimeoutKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

/// One supervisor-initiated action from a timeout sweep.
///
/// # Invariants
/// - `replacement` is present exactly for hard timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutAction {
    /// Worker that missed a deadline.
    pub worker_id: WorkerId,
    /// Which deadline was missed.
    pub kind: TimeoutKind,
    /// Replacement worker spawned for hard timeouts.
    pub replacement: Option<WorkerId>,
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Per-flow timeout supervisor.
///
/// # Invariants
/// - One internal stop token guards every monitoring loop this supervisor
///   starts; `stop_monitoring` is idempotent.
pub struct Supervisor {
    /// Persistence backend.
    store: Arc<dyn WorkflowStore>,
    /// Manager used to replace hard-timed-out workers.
    manager: Arc<WorkerManager>,
    /// Tick period for monitoring loops.
    check_interval: Duration,
    /// Single internal stop signal for all monitoring loops.
    stop: CancellationToken,
}

impl Supervisor {
    /// Creates a supervisor; `ambient` is the process-wide cancellation.
    #[must_use]
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        manager: Arc<WorkerManager>,
        check_interval_sec: u64,
        ambient: &CancellationToken,
    ) -> Self {
        Self {
            store,
            manager,
            check_interval: Duration::from_secs(check_interval_sec),
            stop: ambient.child_token(),
        }
    }

    /// Starts the background monitoring loop for a flow.
    ///
    /// The loop ticks every `check_interval` and exits when the stop token
    /// (or the ambient cancellation above it) fires.
    pub fn start_monitoring(self: &Arc<Self>, flow_id: FlowId) {
        let supervisor = Arc::clone(self);
        let stop = self.stop.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(supervisor.check_interval);
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = supervisor.check_timeouts(&flow_id, now_unix()) {
                            tracing::warn!(flow = %flow_id, error = %err, "timeout sweep failed");
                        }
                    }
                }
            }
            tracing::debug!(flow = %flow_id, "supervision loop exited");
        });
    }

    /// Stops every monitoring loop started by this supervisor. Idempotent.
    pub fn stop_monitoring(&self) {
        self.stop.cancel();
    }

    /// Refreshes a worker's heartbeat to wall-clock `now`.
    ///
    /// # Errors
    ///
    /// Returns `worker_not_found` for unknown ids.
    pub fn heartbeat(&self, worker_id: &WorkerId, now: i64) -> Result<(), EngineError> {
        let mut worker = self.store.get_worker(worker_id)?;
        worker.last_heartbeat = now;
        self.store.update_worker(&worker)
    }

    /// Sweeps a flow's workers for missed deadlines at wall-clock `now`.
    ///
    /// Per worker, the hard deadline is evaluated first; a hard timeout
    /// retires the worker and spawns its replacement in the same pass. A
    /// soft timeout only flags the worker. Terminal workers are skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error when the worker list cannot be read or a
    /// state update fails; replacement failures are reported in the audit
    /// trail without aborting the sweep.
    pub fn check_timeouts(
        &self,
        flow_id: &FlowId,
        now: i64,
    ) -> Result<Vec<TimeoutAction>, EngineError> {
        let workers = self.store.list_workers(flow_id)?;
        let mut actions = Vec::new();
        for worker in workers {
            if worker.state.is_terminal() {
                continue;
            }
            let age = now - worker.last_heartbeat;
            if worker.hard_timeout_sec > 0 && age > worker.hard_timeout_sec {
                let mut retired = worker.clone();
                retired.state = WorkerState::HardTimeout;
                self.store.update_worker(&retired)?;
                let replacement = match self.manager.replace(&worker.worker_id, now) {
                    Ok(fresh) => Some(fresh.worker_id),
                    Err(err) => {
                        tracing::warn!(
                            worker = %worker.worker_id,
                            error = %err,
                            "replacement spawn failed"
                        );
                        None
                    }
                };
                self.audit(
                    flow_id,
                    "hard_timeout",
                    json!({
                        "worker_id": worker.worker_id.as_str(),
                        "age_sec": age,
                        "replacement": replacement.as_ref().map(WorkerId::as_str),
                    }),
                    now,
                );
                actions.push(TimeoutAction {
                    worker_id: worker.worker_id,
                    kind: TimeoutKind::Hard,
                    replacement,
                });
            } else if worker.soft_timeout_sec > 0
                && age > worker.soft_timeout_sec
                && worker.state != WorkerState::SoftTimeout
            {
                let mut flagged = worker.clone();
                flagged.state = WorkerState::SoftTimeout;
                self.store.update_worker(&flagged)?;
                self.audit(
                    flow_id,
                    "soft_timeout",
                    json!({ "worker_id": worker.worker_id.as_str(), "age_sec": age }),
                    now,
                );
                actions.push(TimeoutAction {
                    worker_id: worker.worker_id,
                    kind: TimeoutKind::Soft,
                    replacement: None,
                });
            }
        }
        Ok(actions)
    }

    /// Writes a warning audit record, degrading silently on failure.
    fn audit(&self, flow_id: &FlowId, kind: &str, detail: serde_json::Value, now: i64) {
        let record =
            AuditRecord::new(flow_id.clone(), kind, AuditSeverity::Warning, detail, now);
        if self.store.record_audit(&record).is_err() {
            tracing::warn!(flow = %flow_id, kind, "audit write failed");
        }
    }
}
