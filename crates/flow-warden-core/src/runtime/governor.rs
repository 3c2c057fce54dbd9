// crates/flow-warden-core/src/runtime/governor.rs
// ============================================================================
// Module: Budget Governor
// Description: Per-flow cost accumulation and warn/halt thresholds.
// Purpose: Decide whether spending may continue, should warn, or must halt.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The governor accumulates provider-reported cost against each flow's cap
//! and classifies the result: `halt` at or past the cap, `warn` at or past
//! the warn ratio, `continue` otherwise. A non-positive cap disables
//! enforcement entirely. Accumulation persists under optimistic locking;
//! callers retry on `optimistic_lock`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FlowId;
use crate::core::state::CostDelta;
use crate::core::state::FlowState;
use crate::core::time::now_unix;
use crate::errors::EngineError;
use crate::interfaces::WorkflowStore;

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Ratio of cap at which the governor starts warning.
pub const WARN_RATIO: f64 = 0.8;
/// Ratio of cap at which the governor halts spending.
pub const HALT_RATIO: f64 = 1.0;

// ============================================================================
// SECTION: Cost Action
// ============================================================================

/// Governor classification of a flow's spend level.
///
/// # Invariants
/// - Variants are stable for serialization and gate decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostAction {
    /// Spend is within budget.
    Continue,
    /// Spend is at or past the warn ratio.
    Warn,
    /// Spend is at or past the cap; no further spend is allowed.
    Halt,
}

impl CostAction {
    /// Returns a stable snake_case label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Warn => "warn",
            Self::Halt => "halt",
        }
    }
}

impl fmt::Display for CostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Classifies a spend level against a cap.
///
/// A non-positive cap disables the budget and always continues.
#[must_use]
pub fn evaluate(used: f64, cap: f64) -> CostAction {
    if cap <= 0.0 {
        return CostAction::Continue;
    }
    let ratio = used / cap;
    if ratio >= HALT_RATIO {
        CostAction::Halt
    } else if ratio >= WARN_RATIO {
        CostAction::Warn
    } else {
        CostAction::Continue
    }
}

// ============================================================================
// SECTION: Governor
// ============================================================================

/// Per-flow budget governor backed by the workflow store.
///
/// # Invariants
/// - `budget_used` only grows; accumulation persists under optimistic lock.
#[derive(Clone)]
pub struct BudgetGovernor {
    /// Store holding the flow state the governor accumulates into.
    store: Arc<dyn WorkflowStore>,
}

impl BudgetGovernor {
    /// Creates a governor over the provided store.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Classifies the current spend of a loaded flow state.
    #[must_use]
    pub fn check_budget(state: &FlowState) -> CostAction {
        evaluate(state.budget_used, state.budget_cap)
    }

    /// Adds a cost delta to a flow and persists it under optimistic lock.
    ///
    /// Returns the post-increment classification.
    ///
    /// # Errors
    ///
    /// Returns `flow_not_found` for unknown flows and `optimistic_lock` when
    /// a concurrent update won the race; callers retry from the load.
    pub fn record_usage(
        &self,
        flow_id: &FlowId,
        delta: &CostDelta,
    ) -> Result<CostAction, EngineError> {
        let mut state = self.store.get_flow(flow_id)?;
        let expected_version = state.state_version;
        state.budget_used += delta.amount_usd;
        state.state_version += 1;
        state.updated_at = now_unix();
        self.store.update_flow(expected_version, &state)?;
        Ok(Self::check_budget(&state))
    }
}
