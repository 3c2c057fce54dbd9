// crates/flow-warden-sessions/src/bridge.rs
// ============================================================================
// Module: Engine Bridge
// Description: Marries sessions to the budget governor and the store.
// Purpose: Budget precheck, cost event folding, and session audit.
// Dependencies: flow-warden-core, flow-warden-guard, crate::{event, session},
//               tokio, tokio-util, tracing
// ============================================================================

//! ## Overview
//! The bridge sits between the session manager and the engine. Launch goes
//! through the budget guard; every `cost` event is folded into the governor
//! and appended to the durable delta log before the event is forwarded, so
//! any downstream observer sees the cost already applied. The forwarder
//! terminates when the session channel closes or the ambient cancellation
//! fires, closing its output channel on the way out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use flow_warden_core::AuditRecord;
use flow_warden_core::AuditSeverity;
use flow_warden_core::BudgetGovernor;
use flow_warden_core::CostDelta;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::SessionId;
use flow_warden_core::WorkerRecord;
use flow_warden_core::WorkflowStore;
use flow_warden_core::now_unix;
use flow_warden_guard::Guard;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::EVENT_TYPE_COST;
use crate::event::NormalizedEvent;
use crate::session::SessionConfig;
use crate::session::SessionManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Retry bound for optimistic-lock races while folding one cost event.
const COST_FOLD_RETRIES: usize = 8;

// ============================================================================
// SECTION: Bridge
// ============================================================================

/// Session-to-engine bridge.
///
/// # Invariants
/// - Costs are recorded before the event is forwarded downstream.
pub struct Bridge {
    /// Session manager owning the provider subprocesses.
    sessions: Arc<SessionManager>,
    /// Request-time guard used for the launch budget precheck.
    guard: Arc<Guard>,
    /// Budget governor receiving cost increments.
    governor: BudgetGovernor,
    /// Store receiving durable cost deltas and audit records.
    store: Arc<dyn WorkflowStore>,
    /// Ambient cancellation observed by every forwarder.
    ambient: CancellationToken,
}

impl Bridge {
    /// Creates a bridge over the session manager and engine services.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionManager>,
        guard: Arc<Guard>,
        governor: BudgetGovernor,
        store: Arc<dyn WorkflowStore>,
        ambient: &CancellationToken,
    ) -> Self {
        Self { sessions, guard, governor, store, ambient: ambient.clone() }
    }

    /// Launches a provider session for a worker after a budget precheck.
    ///
    /// The worker's role names the provider to launch.
    ///
    /// # Errors
    ///
    /// Returns `budget_exceeded` when the flow's budget is exhausted and
    /// `provider_unavailable` when the role has no registered provider.
    pub async fn start_session(
        &self,
        worker: &WorkerRecord,
        env: BTreeMap<String, String>,
    ) -> Result<SessionId, EngineError> {
        self.guard.check_budget(&worker.flow_id)?;
        let session_id = self
            .sessions
            .create(&worker.role, SessionConfig { flow_id: worker.flow_id.clone(), env })
            .await?;
        self.audit(
            &worker.flow_id,
            "start_session",
            json!({
                "session_id": session_id.as_str(),
                "worker_id": worker.worker_id.as_str(),
                "provider": worker.role,
            }),
        );
        Ok(session_id)
    }

    /// Stops a session, ignoring stop errors, and audits the decision.
    ///
    /// # Errors
    ///
    /// Returns `session_not_found` when the session is unknown.
    pub async fn stop_session(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let flow_id = self.sessions.flow_of(session_id).await?;
        if let Err(err) = self.sessions.stop(session_id).await {
            tracing::debug!(session = %session_id, error = %err, "stop raced with exit");
        }
        self.audit(&flow_id, "stop_session", json!({ "session_id": session_id.as_str() }));
        Ok(())
    }

    /// Streams a session's events, folding costs into the engine first.
    ///
    /// The returned channel closes when the session's channel closes or the
    /// ambient cancellation fires.
    ///
    /// # Errors
    ///
    /// Returns `session_not_found` for unknown sessions or when the event
    /// channel was already taken.
    pub async fn stream_events(
        &self,
        session_id: &SessionId,
    ) -> Result<mpsc::Receiver<NormalizedEvent>, EngineError> {
        let mut source = self.sessions.take_events(session_id).await?;
        let flow_id = self.sessions.flow_of(session_id).await?;
        let (tx, rx) = mpsc::channel(crate::session::EVENT_CHANNEL_CAPACITY);
        let governor = self.governor.clone();
        let store = Arc::clone(&self.store);
        let ambient = self.ambient.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = ambient.cancelled() => break,
                    event = source.recv() => {
                        let Some(event) = event else { break };
                        if event.event_type == EVENT_TYPE_COST {
                            fold_cost(&governor, store.as_ref(), &flow_id, &event);
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Writes an audit record, degrading silently on failure.
    fn audit(&self, flow_id: &FlowId, kind: &str, detail: serde_json::Value) {
        let record = AuditRecord::new(
            flow_id.clone(),
            kind,
            AuditSeverity::Info,
            detail,
            now_unix(),
        );
        if self.store.record_audit(&record).is_err() {
            tracing::warn!(flow = %flow_id, kind, "audit write failed");
        }
    }
}

// ============================================================================
// SECTION: Cost Folding
// ============================================================================

/// Applies one cost event to the governor and the durable delta log.
///
/// Optimistic-lock races against concurrent updates are retried locally;
/// other failures are logged and the event still flows downstream.
fn fold_cost(
    governor: &BudgetGovernor,
    store: &dyn WorkflowStore,
    flow_id: &FlowId,
    event: &NormalizedEvent,
) {
    let mut delta: CostDelta = serde_json::from_str(&event.payload).unwrap_or_default();
    delta.flow_id = flow_id.clone();
    delta.provider = event.provider.clone();
    delta.created_at = now_unix();

    for attempt in 0..COST_FOLD_RETRIES {
        match governor.record_usage(flow_id, &delta) {
            Ok(_) => break,
            Err(err) if err.is(ErrorCode::OptimisticLock) && attempt + 1 < COST_FOLD_RETRIES => {}
            Err(err) => {
                tracing::warn!(flow = %flow_id, error = %err, "cost fold failed");
                break;
            }
        }
    }
    if let Err(err) = store.insert_cost_delta(&delta) {
        tracing::warn!(flow = %flow_id, error = %err, "cost delta persist failed");
    }
}
