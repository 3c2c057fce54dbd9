// crates/flow-warden-core/src/runtime/gates.rs
// ============================================================================
// Module: Phase Gates
// Description: Composable gate predicates controlling phase exit.
// Purpose: Decide whether a flow may leave its current phase.
// Dependencies: crate::core, crate::runtime::governor
// ============================================================================

//! ## Overview
//! A gate is a predicate on flow state with one method: evaluate. The
//! registry maps each phase to a gate instance; a phase without a gate
//! fails closed with `gate_not_registered`. Wrappers compose: the
//! compaction gate and review gate consult their inner gate first and
//! short-circuit their own lookup when the inner gate already blocks.
//!
//! Invariants:
//! - Gate evaluation never mutates flow state.
//! - Composite gates aggregate blockers in child order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::capability::CompactionSlots;
use crate::core::phase::Phase;
use crate::core::state::FlowState;
use crate::core::state::FlowStatus;
use crate::errors::EngineError;
use crate::errors::ErrorCode;
use crate::runtime::governor;
use crate::runtime::governor::CostAction;

// ============================================================================
// SECTION: Gate Contract
// ============================================================================

/// Outcome of a gate evaluation.
///
/// # Invariants
/// - `blockers` is non-empty whenever `allow` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    /// True when the flow may leave its current phase.
    pub allow: bool,
    /// Reasons the gate blocked, in evaluation order.
    pub blockers: Vec<String>,
}

impl GateDecision {
    /// Returns an allowing decision with no blockers.
    #[must_use]
    pub const fn allow() -> Self {
        Self { allow: true, blockers: Vec::new() }
    }

    /// Returns a blocking decision with the provided reasons.
    #[must_use]
    pub fn block(blockers: Vec<String>) -> Self {
        Self { allow: false, blockers }
    }
}

/// Predicate on flow state controlling phase exit.
pub trait Gate: Send + Sync {
    /// Returns the gate's stable name for diagnostics.
    fn name(&self) -> &str;

    /// Evaluates the gate against a loaded flow state.
    fn evaluate(&self, state: &FlowState) -> GateDecision;
}

// ============================================================================
// SECTION: Default Gate
// ============================================================================

/// Baseline gate: the flow must be running and within budget.
///
/// # Invariants
/// - Blocks with a distinct reason per failed check.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGate;

impl Gate for DefaultGate {
    fn name(&self) -> &str {
        "default"
    }

    fn evaluate(&self, state: &FlowState) -> GateDecision {
        let mut blockers = Vec::new();
        if state.status != FlowStatus::Running {
            blockers.push(format!("flow status is {}", state.status.as_str()));
        }
        if governor::evaluate(state.budget_used, state.budget_cap) == CostAction::Halt {
            blockers.push("budget limit exceeded".to_string());
        }
        if blockers.is_empty() { GateDecision::allow() } else { GateDecision::block(blockers) }
    }
}

// ============================================================================
// SECTION: Compaction Gate
// ============================================================================

/// Callback producing the compaction slots for a flow state.
pub type SlotsFn = dyn Fn(&FlowState) -> CompactionSlots + Send + Sync;

/// Gate requiring valid compaction slots on top of an inner gate.
///
/// # Invariants
/// - `slots_fn` is not invoked when the inner gate already blocks.
pub struct CompactionGate {
    /// Inner gate consulted first.
    inner: Arc<dyn Gate>,
    /// Producer of the slots to validate.
    slots_fn: Box<SlotsFn>,
}

impl CompactionGate {
    /// Wraps an inner gate with compaction slot validation.
    #[must_use]
    pub fn new(
        inner: Arc<dyn Gate>,
        slots_fn: impl Fn(&FlowState) -> CompactionSlots + Send + Sync + 'static,
    ) -> Self {
        Self { inner, slots_fn: Box::new(slots_fn) }
    }
}

impl Gate for CompactionGate {
    fn name(&self) -> &str {
        "compaction"
    }

    fn evaluate(&self, state: &FlowState) -> GateDecision {
        let inner = self.inner.evaluate(state);
        if !inner.allow {
            return inner;
        }
        let slots = (self.slots_fn)(state);
        let violations = slots.validate();
        if violations.is_empty() {
            inner
        } else {
            GateDecision::block(
                violations
                    .into_iter()
                    .map(|violation| format!("compaction slot {} is empty", violation.slot))
                    .collect(),
            )
        }
    }
}

// ============================================================================
// SECTION: Review Gate
// ============================================================================

/// Callback producing the unresolved review blockers for a flow state.
pub type BlockersFn = dyn Fn(&FlowState) -> Vec<String> + Send + Sync;

/// Gate requiring an empty review blocker list on top of an inner gate.
///
/// # Invariants
/// - `blockers_fn` is not invoked when the inner gate already blocks.
pub struct ReviewGate {
    /// Inner gate consulted first.
    inner: Arc<dyn Gate>,
    /// Producer of unresolved review blockers.
    blockers_fn: Box<BlockersFn>,
}

impl ReviewGate {
    /// Wraps an inner gate with review blocker lookup.
    #[must_use]
    pub fn new(
        inner: Arc<dyn Gate>,
        blockers_fn: impl Fn(&FlowState) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        Self { inner, blockers_fn: Box::new(blockers_fn) }
    }
}

impl Gate for ReviewGate {
    fn name(&self) -> &str {
        "review"
    }

    fn evaluate(&self, state: &FlowState) -> GateDecision {
        let inner = self.inner.evaluate(state);
        if !inner.allow {
            return inner;
        }
        let blockers = (self.blockers_fn)(state);
        if blockers.is_empty() { inner } else { GateDecision::block(blockers) }
    }
}

// ============================================================================
// SECTION: Composite Gate
// ============================================================================

/// Gate allowing only when every child allows.
///
/// # Invariants
/// - Every child is evaluated; blockers concatenate in child order.
pub struct CompositeGate {
    /// Child gates evaluated in order.
    children: Vec<Arc<dyn Gate>>,
}

impl CompositeGate {
    /// Creates a composite over the provided children.
    #[must_use]
    pub fn new(children: Vec<Arc<dyn Gate>>) -> Self {
        Self { children }
    }
}

impl Gate for CompositeGate {
    fn name(&self) -> &str {
        "composite"
    }

    fn evaluate(&self, state: &FlowState) -> GateDecision {
        let mut allow = true;
        let mut blockers = Vec::new();
        for child in &self.children {
            let decision = child.evaluate(state);
            allow = allow && decision.allow;
            blockers.extend(decision.blockers);
        }
        if allow { GateDecision::allow() } else { GateDecision::block(blockers) }
    }
}

// ============================================================================
// SECTION: Gate Registry
// ============================================================================

/// Phase-indexed gate registry populated at startup.
///
/// # Invariants
/// - Later registrations for a phase overwrite earlier ones.
/// - Lookup for an unregistered phase fails `gate_not_registered`.
#[derive(Default)]
pub struct GateRegistry {
    /// Gate instances keyed by phase.
    gates: BTreeMap<Phase, Arc<dyn Gate>>,
}

impl GateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with [`DefaultGate`] on every phase.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for phase in Phase::ALL {
            registry.register(phase, Arc::new(DefaultGate));
        }
        registry
    }

    /// Registers a gate for a phase.
    pub fn register(&mut self, phase: Phase, gate: Arc<dyn Gate>) {
        self.gates.insert(phase, gate);
    }

    /// Returns the gate registered for a phase.
    ///
    /// # Errors
    ///
    /// Returns `gate_not_registered` when the phase has no gate.
    pub fn get(&self, phase: Phase) -> Result<Arc<dyn Gate>, EngineError> {
        self.gates.get(&phase).cloned().ok_or_else(|| {
            EngineError::new(
                ErrorCode::GateNotRegistered,
                format!("no gate registered for phase {phase}"),
            )
        })
    }
}
