// crates/flow-warden-core/src/errors.rs
// ============================================================================
// Module: Error Taxonomy
// Description: The single enumerated error code space and its carrier type.
// Purpose: Give every surfaced failure a stable numeric code and message.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every error Flow Warden surfaces carries a stable numeric code from one
//! enumerated taxonomy, grouped by family (FSM/gate 10xx, worker/intent
//! 20xx, session 30xx, guard 40xx, review 50xx, store 60xx). Crate-local
//! errors convert into [`EngineError`] without losing the code. No error is
//! silently converted into success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable error code taxonomy, grouped by family.
///
/// # Invariants
/// - Numeric codes are stable for the life of the wire contract.
/// - Labels are stable snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Transition not present in the phase graph.
    InvalidTransition,
    /// A gate blocked the transition.
    PhaseGateFailed,
    /// Flow id is unknown.
    FlowNotFound,
    /// Flow already reached the terminal phase.
    FlowAlreadyDone,
    /// Conditional write lost an optimistic-lock race.
    OptimisticLock,
    /// No gate registered for the current phase.
    GateNotRegistered,
    /// Flow id already exists.
    DuplicateTask,
    /// Worker id is unknown.
    WorkerNotFound,
    /// Worker exceeded a deadline.
    WorkerTimeout,
    /// Another active intent holds the file.
    IntentConflict,
    /// Intent id is unknown.
    IntentNotFound,
    /// Worker was replaced by the supervisor.
    WorkerReplaced,
    /// Intent lease expired before execution.
    LeaseExpired,
    /// Worker does not own the target file.
    FileOwnership,
    /// Active worker limit reached for the flow.
    WorkerLimitReached,
    /// File content changed under the intent.
    IntentHashMismatch,
    /// Compaction slots failed validation.
    CompactionInvalid,
    /// Worker is already in a terminal state.
    WorkerAlreadyDone,
    /// Session id is unknown.
    SessionNotFound,
    /// Provider name is unknown or already registered.
    ProviderUnavailable,
    /// Capability sheet denied the request.
    PermissionDenied,
    /// Budget governor reported halt.
    BudgetExceeded,
    /// Sliding-window rate limit reached.
    RateLimitExceeded,
    /// Flow exhausted its round budget.
    MaxRoundsExceeded,
    /// Scorecard failed schema validation.
    ScoreCardInvalid,
    /// Consensus requested over zero cards.
    ConsensusNoCards,
    /// Store write failed.
    StoreWrite,
    /// Store schema creation or migration failed.
    SchemaMigration,
    /// Event sequence number collided.
    DuplicateEvent,
    /// Configuration failed validation.
    ConfigInvalid,
}

impl ErrorCode {
    /// Returns the stable numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::InvalidTransition => 1001,
            Self::PhaseGateFailed => 1002,
            Self::FlowNotFound => 1003,
            Self::FlowAlreadyDone => 1004,
            Self::OptimisticLock => 1005,
            Self::GateNotRegistered => 1006,
            Self::DuplicateTask => 1007,
            Self::WorkerNotFound => 2001,
            Self::WorkerTimeout => 2002,
            Self::IntentConflict => 2003,
            Self::IntentNotFound => 2004,
            Self::WorkerReplaced => 2005,
            Self::LeaseExpired => 2006,
            Self::FileOwnership => 2007,
            Self::WorkerLimitReached => 2008,
            Self::IntentHashMismatch => 2009,
            Self::CompactionInvalid => 2010,
            Self::WorkerAlreadyDone => 2011,
            Self::SessionNotFound => 3001,
            Self::ProviderUnavailable => 3002,
            Self::PermissionDenied => 4001,
            Self::BudgetExceeded => 4002,
            Self::RateLimitExceeded => 4003,
            Self::MaxRoundsExceeded => 4004,
            Self::ScoreCardInvalid => 5001,
            Self::ConsensusNoCards => 5002,
            Self::StoreWrite => 6001,
            Self::SchemaMigration => 6002,
            Self::DuplicateEvent => 6003,
            Self::ConfigInvalid => 6004,
        }
    }

    /// Returns the stable snake_case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTransition => "invalid_transition",
            Self::PhaseGateFailed => "phase_gate_failed",
            Self::FlowNotFound => "flow_not_found",
            Self::FlowAlreadyDone => "flow_already_done",
            Self::OptimisticLock => "optimistic_lock",
            Self::GateNotRegistered => "gate_not_registered",
            Self::DuplicateTask => "duplicate_task",
            Self::WorkerNotFound => "worker_not_found",
            Self::WorkerTimeout => "worker_timeout",
            Self::IntentConflict => "intent_conflict",
            Self::IntentNotFound => "intent_not_found",
            Self::WorkerReplaced => "worker_replaced",
            Self::LeaseExpired => "lease_expired",
            Self::FileOwnership => "file_ownership",
            Self::WorkerLimitReached => "worker_limit_reached",
            Self::IntentHashMismatch => "intent_hash_mismatch",
            Self::CompactionInvalid => "compaction_invalid",
            Self::WorkerAlreadyDone => "worker_already_done",
            Self::SessionNotFound => "session_not_found",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::PermissionDenied => "permission_denied",
            Self::BudgetExceeded => "budget_exceeded",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::MaxRoundsExceeded => "max_rounds_exceeded",
            Self::ScoreCardInvalid => "score_card_invalid",
            Self::ConsensusNoCards => "consensus_no_cards",
            Self::StoreWrite => "store_write",
            Self::SchemaMigration => "schema_migration",
            Self::DuplicateEvent => "duplicate_event",
            Self::ConfigInvalid => "config_invalid",
        }
    }
}

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Carrier for every externally surfaced failure.
///
/// # Invariants
/// - `code` is stable; `message` is short and human-readable.
/// - `blockers` is non-empty only for gate failures and validation errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{} ({}): {message}", .code.as_str(), .code.code())]
pub struct EngineError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Short human-readable message.
    pub message: String,
    /// Gate blockers or validation violations, when applicable.
    pub blockers: Vec<String>,
}

impl EngineError {
    /// Creates an error with an empty blocker list.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), blockers: Vec::new() }
    }

    /// Creates an error carrying gate blockers or validation violations.
    #[must_use]
    pub fn with_blockers(
        code: ErrorCode,
        message: impl Into<String>,
        blockers: Vec<String>,
    ) -> Self {
        Self { code, message: message.into(), blockers }
    }

    /// Returns true when the error carries the given code.
    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}
