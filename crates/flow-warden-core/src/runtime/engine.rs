// crates/flow-warden-core/src/runtime/engine.rs
// ============================================================================
// Module: Workflow Engine
// Description: Flow creation and gate-checked phase transitions.
// Purpose: Drive the seven-phase state machine over the workflow store.
// Dependencies: crate::core, crate::interfaces, crate::runtime::gates
// ============================================================================

//! ## Overview
//! The engine owns the flow lifecycle: `start_flow` writes the initial state
//! and the mandatory `flow_started` event in one transaction; `advance`
//! evaluates the current phase's gate, resolves the target phase from the
//! trigger action, and commits the transition event, boundary snapshot, and
//! state update atomically under optimistic locking. Concurrent advances on
//! one flow serialize through the lock; the loser retries from the load.
//!
//! Invariants:
//! - Gate evaluation precedes target resolution.
//! - `round` increments only on the two back-edges.
//! - Reaching [`Phase::Complete`] sets the status to completed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;

use crate::core::identifiers::FlowId;
use crate::core::phase::Phase;
use crate::core::phase::TriggerAction;
use crate::core::state::EVENT_FLOW_STARTED;
use crate::core::state::EVENT_PHASE_TRANSITION;
use crate::core::state::FlowState;
use crate::core::state::FlowStatus;
use crate::core::state::PhaseSnapshot;
use crate::core::state::TransitionPayload;
use crate::core::state::WorkflowEvent;
use crate::core::time::now_unix;
use crate::errors::EngineError;
use crate::errors::ErrorCode;
use crate::interfaces::WorkflowStore;
use crate::runtime::gates::GateRegistry;

// ============================================================================
// SECTION: Triggers
// ============================================================================

/// A caller-supplied trigger for one phase transition.
///
/// # Invariants
/// - `actor` is recorded verbatim in the transition event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceTrigger {
    /// Requested action.
    pub action: TriggerAction,
    /// Actor requesting the transition.
    pub actor: String,
}

/// Result of an accepted phase transition.
///
/// # Invariants
/// - `state` reflects the committed post-transition flow state.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceOutcome {
    /// Committed flow state after the transition.
    pub state: FlowState,
    /// Phase the flow left.
    pub from: Phase,
    /// Phase the flow entered.
    pub to: Phase,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// The seven-phase workflow engine.
///
/// # Invariants
/// - All multi-statement writes go through the store's composite atomic
///   operations.
pub struct WorkflowEngine {
    /// Persistence backend.
    store: Arc<dyn WorkflowStore>,
    /// Phase-indexed gates consulted before every transition.
    gates: GateRegistry,
}

impl WorkflowEngine {
    /// Creates an engine over a store and a populated gate registry.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, gates: GateRegistry) -> Self {
        Self { store, gates }
    }

    /// Returns the engine's store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn WorkflowStore> {
        Arc::clone(&self.store)
    }

    /// Creates a flow at [`Phase::Intake`] with the mandatory first event.
    ///
    /// # Errors
    ///
    /// Returns `duplicate_task` when the flow id already exists, or a store
    /// error on write failure.
    pub fn start_flow(&self, flow_id: FlowId, budget_cap: f64) -> Result<FlowState, EngineError> {
        let now = now_unix();
        let state = FlowState::initial(flow_id.clone(), budget_cap, now);
        let first_event = WorkflowEvent::new(
            flow_id,
            1,
            Phase::Intake,
            EVENT_FLOW_STARTED,
            json!({ "budget_cap": budget_cap }),
            now,
        )
        .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        self.store.insert_flow(&state, &first_event)?;
        Ok(state)
    }

    /// Loads a flow by id.
    ///
    /// # Errors
    ///
    /// Returns `flow_not_found` when the id is unknown.
    pub fn get_flow(&self, flow_id: &FlowId) -> Result<FlowState, EngineError> {
        self.store.get_flow(flow_id)
    }

    /// Applies one trigger to a flow, committing the transition atomically.
    ///
    /// # Errors
    ///
    /// Returns `flow_already_done` for completed flows, `phase_gate_failed`
    /// with blockers when the gate denies, `invalid_transition` for illegal
    /// action/phase combinations, and `optimistic_lock` when a concurrent
    /// advance won the race (callers retry from the load).
    pub fn advance(
        &self,
        flow_id: &FlowId,
        trigger: &AdvanceTrigger,
    ) -> Result<AdvanceOutcome, EngineError> {
        let state = self.store.get_flow(flow_id)?;
        if state.status == FlowStatus::Completed {
            return Err(EngineError::new(
                ErrorCode::FlowAlreadyDone,
                format!("flow {flow_id} is already complete"),
            ));
        }

        let gate = self.gates.get(state.current_phase)?;
        let decision = gate.evaluate(&state);
        if !decision.allow {
            return Err(EngineError::with_blockers(
                ErrorCode::PhaseGateFailed,
                format!("gate {} blocked phase {}", gate.name(), state.current_phase),
                decision.blockers,
            ));
        }

        let target = resolve_target(state.current_phase, trigger.action)?;
        if !Phase::is_valid_transition(state.current_phase, target) {
            return Err(EngineError::new(
                ErrorCode::InvalidTransition,
                format!("transition {} -> {target} is not legal", state.current_phase),
            ));
        }

        let now = now_unix();
        let from = state.current_phase;
        let mut next = state.clone();
        next.current_phase = target;
        next.state_version += 1;
        next.last_event_seq += 1;
        next.updated_at = now;
        if Phase::is_back_edge(from, target) {
            next.round += 1;
        }
        if target == Phase::Complete {
            next.status = FlowStatus::Completed;
        }

        let payload = TransitionPayload {
            from,
            to: target,
            action: trigger.action,
            actor: trigger.actor.clone(),
        };
        let payload_json = serde_json::to_value(&payload)
            .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        let event = WorkflowEvent::new(
            flow_id.clone(),
            next.last_event_seq,
            from,
            EVENT_PHASE_TRANSITION,
            payload_json,
            now,
        )
        .map_err(|err| EngineError::new(ErrorCode::StoreWrite, err.to_string()))?;
        let snapshot = PhaseSnapshot {
            flow_id: flow_id.clone(),
            phase: target,
            round: next.round,
            payload: json!({
                "from": from.as_str(),
                "action": trigger.action.as_str(),
            }),
            created_at: now,
        };

        self.store.commit_transition(state.state_version, &next, &event, &snapshot)?;
        Ok(AdvanceOutcome { state: next, from, to: target })
    }
}

// ============================================================================
// SECTION: Target Resolution
// ============================================================================

/// Resolves the target phase for an action from the current phase.
///
/// # Errors
///
/// Returns `invalid_transition` when the action is not legal from the
/// current phase (forward past Complete, rollback outside Verification,
/// rework outside Consensus).
fn resolve_target(current: Phase, action: TriggerAction) -> Result<Phase, EngineError> {
    match action {
        TriggerAction::Advance => current.next().ok_or_else(|| {
            EngineError::new(
                ErrorCode::InvalidTransition,
                "no forward transition is defined from the terminal phase",
            )
        }),
        TriggerAction::Rollback => {
            if current == Phase::Verification {
                Ok(Phase::Implementation)
            } else {
                Err(EngineError::new(
                    ErrorCode::InvalidTransition,
                    format!("rollback is not legal from phase {current}"),
                ))
            }
        }
        TriggerAction::Rework => {
            if current == Phase::Consensus {
                Ok(Phase::Review)
            } else {
                Err(EngineError::new(
                    ErrorCode::InvalidTransition,
                    format!("rework is not legal from phase {current}"),
                ))
            }
        }
    }
}
