// crates/flow-warden-core/src/lib.rs
// ============================================================================
// Module: Flow Warden Core Library
// Description: Phase state machine, data model, gates, budget, and review.
// Purpose: Provide the deterministic workflow engine shared by all crates.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! Flow Warden Core owns the seven-phase review workflow: the phase graph and
//! its two back-edges, the optimistic-lock-protected state machine, the gate
//! registry, the budget governor, and the review consensus engine. The store
//! contract lives in [`interfaces`]; a reference in-memory implementation
//! lives in [`runtime::memory`].
//!
//! Invariants:
//! - Workflow events are append-only and densely numbered from 1 per flow.
//! - State versions strictly increase on every successful update.
//! - Completed flows are terminal and reject further triggers.
//!
//! Security posture: flow state and event payloads are untrusted on load;
//! event payload hashes are verified before use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod errors;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::capability::CapabilitySheet;
pub use crate::core::capability::CompactionSlots;
pub use crate::core::capability::SlotViolation;
pub use crate::core::hashing;
pub use crate::core::identifiers::FlowId;
pub use crate::core::identifiers::IntentId;
pub use crate::core::identifiers::ReviewId;
pub use crate::core::identifiers::SessionId;
pub use crate::core::identifiers::WorkerId;
pub use crate::core::phase::Phase;
pub use crate::core::phase::TriggerAction;
pub use crate::core::review::Issue;
pub use crate::core::review::IssueSeverity;
pub use crate::core::review::ScoreCard;
pub use crate::core::review::Scores;
pub use crate::core::review::Verdict;
pub use crate::core::state::AuditRecord;
pub use crate::core::state::AuditSeverity;
pub use crate::core::state::CostDelta;
pub use crate::core::state::EVENT_FLOW_STARTED;
pub use crate::core::state::EVENT_PHASE_TRANSITION;
pub use crate::core::state::FlowState;
pub use crate::core::state::FlowStatus;
pub use crate::core::state::IntentOperation;
pub use crate::core::state::IntentRecord;
pub use crate::core::state::IntentStatus;
pub use crate::core::state::PhaseSnapshot;
pub use crate::core::state::TransitionPayload;
pub use crate::core::state::WorkerRecord;
pub use crate::core::state::WorkerState;
pub use crate::core::state::WorkflowEvent;
pub use crate::core::time::now_nanos;
pub use crate::core::time::now_unix;
pub use crate::errors::EngineError;
pub use crate::errors::ErrorCode;
pub use crate::interfaces::WorkflowStore;
pub use crate::runtime::consensus::BlockerChecker;
pub use crate::runtime::consensus::ConsensusEngine;
pub use crate::runtime::consensus::ConsensusOutcome;
pub use crate::runtime::consensus::SchemaValidator;
pub use crate::runtime::engine::AdvanceOutcome;
pub use crate::runtime::engine::AdvanceTrigger;
pub use crate::runtime::engine::WorkflowEngine;
pub use crate::runtime::gates::CompactionGate;
pub use crate::runtime::gates::CompositeGate;
pub use crate::runtime::gates::DefaultGate;
pub use crate::runtime::gates::Gate;
pub use crate::runtime::gates::GateDecision;
pub use crate::runtime::gates::GateRegistry;
pub use crate::runtime::gates::ReviewGate;
pub use crate::runtime::governor::BudgetGovernor;
pub use crate::runtime::governor::CostAction;
pub use crate::runtime::memory::InMemoryWorkflowStore;
