// crates/flow-warden-core/src/interfaces/mod.rs
// ============================================================================
// Module: Store Interfaces
// Description: Backend-agnostic persistence contract for workflow state.
// Purpose: Define the single-writer store surface used by the engine.
// Dependencies: crate::core, crate::errors
// ============================================================================

//! ## Overview
//! [`WorkflowStore`] is the persistence contract shared by the SQLite store
//! and the in-memory reference store. Multi-statement write paths are
//! expressed as composite operations so implementations can commit them in
//! one transaction. Implementations accept exactly one concurrent writer;
//! callers fetch everything a transaction needs before invoking a write.
//!
//! Security posture: store contents are untrusted on load; event payload
//! digests are verified before records are handed to callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::FlowId;
use crate::core::identifiers::IntentId;
use crate::core::identifiers::WorkerId;
use crate::core::phase::Phase;
use crate::core::review::ScoreCard;
use crate::core::state::AuditRecord;
use crate::core::state::CostDelta;
use crate::core::state::FlowState;
use crate::core::state::IntentRecord;
use crate::core::state::PhaseSnapshot;
use crate::core::state::WorkerRecord;
use crate::core::state::WorkflowEvent;
use crate::errors::EngineError;

// ============================================================================
// SECTION: Workflow Store
// ============================================================================

/// Single-writer persistence contract for the workflow engine.
///
/// # Invariants
/// - `(flow_id, seq_no)` is unique across events; violations surface
///   `duplicate_event`.
/// - Conditional flow updates surface `optimistic_lock` on version mismatch.
/// - Composite operations commit atomically or not at all.
pub trait WorkflowStore: Send + Sync {
    /// Inserts a new flow and its mandatory `flow_started` event atomically.
    ///
    /// # Errors
    ///
    /// Returns `duplicate_task` when the flow id already exists, or a store
    /// error on write failure.
    fn insert_flow(
        &self,
        state: &FlowState,
        first_event: &WorkflowEvent,
    ) -> Result<(), EngineError>;

    /// Loads a flow by id.
    ///
    /// # Errors
    ///
    /// Returns `flow_not_found` when the id is unknown.
    fn get_flow(&self, flow_id: &FlowId) -> Result<FlowState, EngineError>;

    /// Conditionally updates a flow predicated on its current version.
    ///
    /// The stored version must equal `expected_version`; on success the
    /// stored record carries `state.state_version` (already incremented by
    /// the caller).
    ///
    /// # Errors
    ///
    /// Returns `optimistic_lock` on version mismatch, `flow_not_found` when
    /// the id is unknown.
    fn update_flow(&self, expected_version: u64, state: &FlowState) -> Result<(), EngineError>;

    /// Commits a phase transition atomically: event append, snapshot save,
    /// and conditional state update in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `optimistic_lock` on version mismatch, `duplicate_event` on
    /// sequence collision, or a store error on write failure.
    fn commit_transition(
        &self,
        expected_version: u64,
        state: &FlowState,
        event: &WorkflowEvent,
        snapshot: &PhaseSnapshot,
    ) -> Result<(), EngineError>;

    /// Appends a single event.
    ///
    /// # Errors
    ///
    /// Returns `duplicate_event` when `(flow_id, seq_no)` already exists.
    fn append_event(&self, event: &WorkflowEvent) -> Result<(), EngineError>;

    /// Lists events with `seq_no > since_seq` in sequence order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure or payload digest mismatch.
    fn list_events_since(
        &self,
        flow_id: &FlowId,
        since_seq: u64,
    ) -> Result<Vec<WorkflowEvent>, EngineError>;

    /// Saves a phase boundary snapshot.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn save_snapshot(&self, snapshot: &PhaseSnapshot) -> Result<(), EngineError>;

    /// Returns the latest snapshot for `(flow_id, phase)`, if any.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn latest_snapshot(
        &self,
        flow_id: &FlowId,
        phase: Phase,
    ) -> Result<Option<PhaseSnapshot>, EngineError>;

    /// Inserts a worker record.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn insert_worker(&self, worker: &WorkerRecord) -> Result<(), EngineError>;

    /// Loads a worker by id.
    ///
    /// # Errors
    ///
    /// Returns `worker_not_found` when the id is unknown.
    fn get_worker(&self, worker_id: &WorkerId) -> Result<WorkerRecord, EngineError>;

    /// Updates a worker record in place.
    ///
    /// # Errors
    ///
    /// Returns `worker_not_found` when the id is unknown.
    fn update_worker(&self, worker: &WorkerRecord) -> Result<(), EngineError>;

    /// Lists all workers for a flow in creation order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn list_workers(&self, flow_id: &FlowId) -> Result<Vec<WorkerRecord>, EngineError>;

    /// Inserts or replaces an intent by id.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn upsert_intent(&self, intent: &IntentRecord) -> Result<(), EngineError>;

    /// Loads an intent by id.
    ///
    /// # Errors
    ///
    /// Returns `intent_not_found` when the id is unknown.
    fn get_intent(&self, intent_id: &IntentId) -> Result<IntentRecord, EngineError>;

    /// Lists pending-or-running intents for `(flow_id, target_file)`.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn find_active_by_file(
        &self,
        flow_id: &FlowId,
        target_file: &str,
    ) -> Result<Vec<IntentRecord>, EngineError>;

    /// Lists all pending-or-running intents for a flow.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn list_active_intents(&self, flow_id: &FlowId) -> Result<Vec<IntentRecord>, EngineError>;

    /// Marks an intent done and records its post-execution hash.
    ///
    /// # Errors
    ///
    /// Returns `intent_not_found` when the id is unknown.
    fn mark_intent_done(&self, intent_id: &IntentId, post_hash: &str) -> Result<(), EngineError>;

    /// Records an immutable audit entry.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn record_audit(&self, record: &AuditRecord) -> Result<(), EngineError>;

    /// Lists audit entries for a flow in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn list_audit(&self, flow_id: &FlowId) -> Result<Vec<AuditRecord>, EngineError>;

    /// Inserts a scorecard for a flow.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn insert_score_card(&self, flow_id: &FlowId, card: &ScoreCard) -> Result<(), EngineError>;

    /// Lists scorecards for a flow in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn list_score_cards(&self, flow_id: &FlowId) -> Result<Vec<ScoreCard>, EngineError>;

    /// Appends a cost delta.
    ///
    /// # Errors
    ///
    /// Returns a store error on write failure.
    fn insert_cost_delta(&self, delta: &CostDelta) -> Result<(), EngineError>;

    /// Lists cost deltas for a flow in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn list_cost_deltas(&self, flow_id: &FlowId) -> Result<Vec<CostDelta>, EngineError>;
}
