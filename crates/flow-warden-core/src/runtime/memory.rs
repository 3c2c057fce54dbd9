// crates/flow-warden-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Workflow Store
// Description: Reference WorkflowStore for tests and embedded use.
// Purpose: Mirror the persistence contract without a database file.
// Dependencies: crate::core, crate::errors, crate::interfaces
// ============================================================================

//! ## Overview
//! A mutex-guarded in-memory implementation of [`WorkflowStore`]. Composite
//! operations validate every precondition before mutating, so a failed
//! commit leaves the store untouched, matching the transactional contract
//! of the durable store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::core::identifiers::FlowId;
use crate::core::identifiers::IntentId;
use crate::core::identifiers::WorkerId;
use crate::core::phase::Phase;
use crate::core::review::ScoreCard;
use crate::core::state::AuditRecord;
use crate::core::state::CostDelta;
use crate::core::state::FlowState;
use crate::core::state::IntentRecord;
use crate::core::state::IntentStatus;
use crate::core::state::PhaseSnapshot;
use crate::core::state::WorkerRecord;
use crate::core::state::WorkflowEvent;
use crate::errors::EngineError;
use crate::errors::ErrorCode;
use crate::interfaces::WorkflowStore;

// ============================================================================
// SECTION: Inner State
// ============================================================================

/// Mutable store contents behind the mutex.
#[derive(Default)]
struct Inner {
    /// Flow states keyed by id.
    flows: BTreeMap<FlowId, FlowState>,
    /// Events keyed by `(flow_id, seq_no)`.
    events: BTreeMap<(FlowId, u64), WorkflowEvent>,
    /// Snapshots in insertion order.
    snapshots: Vec<PhaseSnapshot>,
    /// Workers keyed by id, with insertion order preserved separately.
    workers: BTreeMap<WorkerId, WorkerRecord>,
    /// Worker ids in insertion order.
    worker_order: Vec<WorkerId>,
    /// Intents keyed by id.
    intents: BTreeMap<IntentId, IntentRecord>,
    /// Audit records in insertion order.
    audit: Vec<AuditRecord>,
    /// Scorecards with their owning flow, in insertion order.
    score_cards: Vec<(FlowId, ScoreCard)>,
    /// Cost deltas in insertion order.
    cost_deltas: Vec<CostDelta>,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory reference implementation of [`WorkflowStore`].
///
/// # Invariants
/// - A single mutex serializes all access, matching the single-writer
///   contract of the durable store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    /// Guarded store contents.
    inner: Mutex<Inner>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the inner state, recovering from poisoned locks.
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn insert_flow(
        &self,
        state: &FlowState,
        first_event: &WorkflowEvent,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        if inner.flows.contains_key(&state.flow_id) {
            return Err(EngineError::new(
                ErrorCode::DuplicateTask,
                format!("flow {} already exists", state.flow_id),
            ));
        }
        inner.flows.insert(state.flow_id.clone(), state.clone());
        inner
            .events
            .insert((first_event.flow_id.clone(), first_event.seq_no), first_event.clone());
        Ok(())
    }

    fn get_flow(&self, flow_id: &FlowId) -> Result<FlowState, EngineError> {
        self.lock().flows.get(flow_id).cloned().ok_or_else(|| {
            EngineError::new(ErrorCode::FlowNotFound, format!("flow {flow_id} not found"))
        })
    }

    fn update_flow(&self, expected_version: u64, state: &FlowState) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let stored = inner.flows.get_mut(&state.flow_id).ok_or_else(|| {
            EngineError::new(ErrorCode::FlowNotFound, format!("flow {} not found", state.flow_id))
        })?;
        if stored.state_version != expected_version {
            return Err(EngineError::new(
                ErrorCode::OptimisticLock,
                format!(
                    "flow {} version {} does not match expected {expected_version}",
                    state.flow_id, stored.state_version
                ),
            ));
        }
        *stored = state.clone();
        Ok(())
    }

    fn commit_transition(
        &self,
        expected_version: u64,
        state: &FlowState,
        event: &WorkflowEvent,
        snapshot: &PhaseSnapshot,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let stored = inner.flows.get(&state.flow_id).ok_or_else(|| {
            EngineError::new(ErrorCode::FlowNotFound, format!("flow {} not found", state.flow_id))
        })?;
        if stored.state_version != expected_version {
            return Err(EngineError::new(
                ErrorCode::OptimisticLock,
                format!(
                    "flow {} version {} does not match expected {expected_version}",
                    state.flow_id, stored.state_version
                ),
            ));
        }
        let event_key = (event.flow_id.clone(), event.seq_no);
        if inner.events.contains_key(&event_key) {
            return Err(EngineError::new(
                ErrorCode::DuplicateEvent,
                format!("event seq {} already exists for flow {}", event.seq_no, event.flow_id),
            ));
        }
        inner.events.insert(event_key, event.clone());
        inner.snapshots.push(snapshot.clone());
        inner.flows.insert(state.flow_id.clone(), state.clone());
        Ok(())
    }

    fn append_event(&self, event: &WorkflowEvent) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let key = (event.flow_id.clone(), event.seq_no);
        if inner.events.contains_key(&key) {
            return Err(EngineError::new(
                ErrorCode::DuplicateEvent,
                format!("event seq {} already exists for flow {}", event.seq_no, event.flow_id),
            ));
        }
        inner.events.insert(key, event.clone());
        Ok(())
    }

    fn list_events_since(
        &self,
        flow_id: &FlowId,
        since_seq: u64,
    ) -> Result<Vec<WorkflowEvent>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .events
            .range((flow_id.clone(), since_seq.saturating_add(1))..=(flow_id.clone(), u64::MAX))
            .map(|(_, event)| event.clone())
            .collect())
    }

    fn save_snapshot(&self, snapshot: &PhaseSnapshot) -> Result<(), EngineError> {
        self.lock().snapshots.push(snapshot.clone());
        Ok(())
    }

    fn latest_snapshot(
        &self,
        flow_id: &FlowId,
        phase: Phase,
    ) -> Result<Option<PhaseSnapshot>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .snapshots
            .iter()
            .rev()
            .find(|snapshot| snapshot.flow_id == *flow_id && snapshot.phase == phase)
            .cloned())
    }

    fn insert_worker(&self, worker: &WorkerRecord) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.workers.insert(worker.worker_id.clone(), worker.clone());
        inner.worker_order.push(worker.worker_id.clone());
        Ok(())
    }

    fn get_worker(&self, worker_id: &WorkerId) -> Result<WorkerRecord, EngineError> {
        self.lock().workers.get(worker_id).cloned().ok_or_else(|| {
            EngineError::new(ErrorCode::WorkerNotFound, format!("worker {worker_id} not found"))
        })
    }

    fn update_worker(&self, worker: &WorkerRecord) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let stored = inner.workers.get_mut(&worker.worker_id).ok_or_else(|| {
            EngineError::new(
                ErrorCode::WorkerNotFound,
                format!("worker {} not found", worker.worker_id),
            )
        })?;
        *stored = worker.clone();
        Ok(())
    }

    fn list_workers(&self, flow_id: &FlowId) -> Result<Vec<WorkerRecord>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .worker_order
            .iter()
            .filter_map(|id| inner.workers.get(id))
            .filter(|worker| worker.flow_id == *flow_id)
            .cloned()
            .collect())
    }

    fn upsert_intent(&self, intent: &IntentRecord) -> Result<(), EngineError> {
        self.lock().intents.insert(intent.intent_id.clone(), intent.clone());
        Ok(())
    }

    fn get_intent(&self, intent_id: &IntentId) -> Result<IntentRecord, EngineError> {
        self.lock().intents.get(intent_id).cloned().ok_or_else(|| {
            EngineError::new(ErrorCode::IntentNotFound, format!("intent {intent_id} not found"))
        })
    }

    fn find_active_by_file(
        &self,
        flow_id: &FlowId,
        target_file: &str,
    ) -> Result<Vec<IntentRecord>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .intents
            .values()
            .filter(|intent| {
                intent.flow_id == *flow_id
                    && intent.target_file == target_file
                    && intent.status.is_active()
            })
            .cloned()
            .collect())
    }

    fn list_active_intents(&self, flow_id: &FlowId) -> Result<Vec<IntentRecord>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .intents
            .values()
            .filter(|intent| intent.flow_id == *flow_id && intent.status.is_active())
            .cloned()
            .collect())
    }

    fn mark_intent_done(&self, intent_id: &IntentId, post_hash: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let intent = inner.intents.get_mut(intent_id).ok_or_else(|| {
            EngineError::new(ErrorCode::IntentNotFound, format!("intent {intent_id} not found"))
        })?;
        intent.status = IntentStatus::Done;
        intent.post_hash = post_hash.to_string();
        Ok(())
    }

    fn record_audit(&self, record: &AuditRecord) -> Result<(), EngineError> {
        self.lock().audit.push(record.clone());
        Ok(())
    }

    fn list_audit(&self, flow_id: &FlowId) -> Result<Vec<AuditRecord>, EngineError> {
        let inner = self.lock();
        Ok(inner.audit.iter().filter(|record| record.flow_id == *flow_id).cloned().collect())
    }

    fn insert_score_card(&self, flow_id: &FlowId, card: &ScoreCard) -> Result<(), EngineError> {
        self.lock().score_cards.push((flow_id.clone(), card.clone()));
        Ok(())
    }

    fn list_score_cards(&self, flow_id: &FlowId) -> Result<Vec<ScoreCard>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .score_cards
            .iter()
            .filter(|(owner, _)| owner == flow_id)
            .map(|(_, card)| card.clone())
            .collect())
    }

    fn insert_cost_delta(&self, delta: &CostDelta) -> Result<(), EngineError> {
        self.lock().cost_deltas.push(delta.clone());
        Ok(())
    }

    fn list_cost_deltas(&self, flow_id: &FlowId) -> Result<Vec<CostDelta>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .cost_deltas
            .iter()
            .filter(|delta| delta.flow_id == *flow_id)
            .cloned()
            .collect())
    }
}
