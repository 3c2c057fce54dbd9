// crates/flow-warden-guard/src/guard.rs
// ============================================================================
// Module: Composite Guard
// Description: Fixed-order request-time policy chain.
// Purpose: Run budget, permission, rate, and round checks as one unit.
// Dependencies: flow-warden-core, crate::{permissions, rate}
// ============================================================================

//! ## Overview
//! `check_all` runs the four request-time checks in a fixed order and
//! returns the first failure: budget halt, capability sheet, sliding rate
//! window, round cap. Order matters: a halted budget must win over a noisy
//! rate window so operators see the real reason spending stopped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use flow_warden_core::CapabilitySheet;
use flow_warden_core::CostAction;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::WorkflowStore;
use flow_warden_core::runtime::governor;

use crate::permissions::PermissionBroker;
use crate::rate::RateLimiter;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Tunables for the composite guard.
///
/// # Invariants
/// - `rate_limit_per_minute` bounds checks per flow per 60-second window.
/// - `max_rounds` bounds back-edge traversals per flow.
#[derive(Debug, Clone, Copy)]
pub struct GuardConfig {
    /// Checks allowed per flow per window.
    pub rate_limit_per_minute: u32,
    /// Back-edge traversals allowed per flow.
    pub max_rounds: u32,
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Composite request-time guard.
///
/// # Invariants
/// - Checks run in the fixed order budget, permission, rate, rounds.
pub struct Guard {
    /// Store used to load flow state for budget and round checks.
    store: Arc<dyn WorkflowStore>,
    /// Capability sheet enforcement point.
    broker: PermissionBroker,
    /// Sliding-window rate limiter.
    limiter: RateLimiter,
    /// Round cap applied after the rate check.
    max_rounds: u32,
}

impl Guard {
    /// Creates a guard over the store with the provided tunables.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, config: GuardConfig) -> Self {
        let broker = PermissionBroker::new(Arc::clone(&store));
        Self {
            store,
            broker,
            limiter: RateLimiter::new(config.rate_limit_per_minute),
            max_rounds: config.max_rounds,
        }
    }

    /// Returns the broker for sheet construction.
    #[must_use]
    pub const fn broker(&self) -> &PermissionBroker {
        &self.broker
    }

    /// Checks only the budget gate for a flow.
    ///
    /// # Errors
    ///
    /// Returns `budget_exceeded` when the governor reports halt, or
    /// `flow_not_found` for unknown flows.
    pub fn check_budget(&self, flow_id: &FlowId) -> Result<(), EngineError> {
        let state = self.store.get_flow(flow_id)?;
        if governor::evaluate(state.budget_used, state.budget_cap) == CostAction::Halt {
            return Err(EngineError::new(
                ErrorCode::BudgetExceeded,
                format!("flow {flow_id} budget is exhausted"),
            ));
        }
        Ok(())
    }

    /// Runs all four checks in order, returning the first failure.
    ///
    /// # Errors
    ///
    /// Returns `budget_exceeded`, `permission_denied`,
    /// `rate_limit_exceeded`, or `max_rounds_exceeded` from the first
    /// failing check; `flow_not_found` when the flow is unknown.
    pub fn check_all(
        &self,
        flow_id: &FlowId,
        path: &str,
        command: &str,
        sheet: &CapabilitySheet,
        now: i64,
    ) -> Result<(), EngineError> {
        self.check_budget(flow_id)?;
        self.broker.check_permission(sheet, path, command)?;
        self.limiter.check(flow_id, now)?;
        self.check_rounds(flow_id)?;
        Ok(())
    }

    /// Checks the round cap for a flow.
    ///
    /// # Errors
    ///
    /// Returns `max_rounds_exceeded` once the flow's round count reaches
    /// the cap.
    fn check_rounds(&self, flow_id: &FlowId) -> Result<(), EngineError> {
        let state = self.store.get_flow(flow_id)?;
        if state.round >= self.max_rounds {
            return Err(EngineError::new(
                ErrorCode::MaxRoundsExceeded,
                format!("flow {flow_id} reached the round cap of {}", self.max_rounds),
            ));
        }
        Ok(())
    }
}
