// crates/flow-warden-core/src/core/state.rs
// ============================================================================
// Module: Workflow State Records
// Description: Flow state, events, snapshots, workers, intents, audit, cost.
// Purpose: Capture the persistent control-plane records for a workflow.
// Dependencies: crate::core::{hashing, identifiers, phase}, serde, serde_json
// ============================================================================

//! ## Overview
//! The records in this module are the persistent truth of a workflow. Flow
//! state is updated under optimistic locking; events are append-only and
//! densely numbered; audit records are immutable; cost deltas only
//! accumulate.
//!
//! Security posture: all records are untrusted on load. Event payloads carry
//! a canonical-JSON digest verified by the store before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing;
use crate::core::hashing::HashingError;
use crate::core::identifiers::FlowId;
use crate::core::identifiers::IntentId;
use crate::core::identifiers::WorkerId;
use crate::core::phase::Phase;
use crate::core::phase::TriggerAction;
use crate::core::time::now_nanos;

// ============================================================================
// SECTION: Event Type Labels
// ============================================================================

/// Event type written once when a flow is created.
pub const EVENT_FLOW_STARTED: &str = "flow_started";
/// Event type written for every accepted phase transition.
pub const EVENT_PHASE_TRANSITION: &str = "phase_transition";

// ============================================================================
// SECTION: Flow State
// ============================================================================

/// Flow lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and event payloads.
/// - `Completed` implies the current phase is [`Phase::Complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Flow is active and accepting triggers.
    Running,
    /// Flow is blocked on an external decision.
    Blocked,
    /// Flow has failed.
    Failed,
    /// Flow has reached the terminal phase.
    Completed,
}

impl FlowStatus {
    /// Returns a stable snake_case label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Parses a stable label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        [Self::Running, Self::Blocked, Self::Failed, Self::Completed]
            .into_iter()
            .find(|status| status.as_str() == label)
    }
}

/// Durable state of a single flow.
///
/// # Invariants
/// - `state_version` strictly increases on every successful update.
/// - `budget_used` is non-negative; `round` increments only on back-edges.
/// - `last_event_seq` equals the highest persisted event `seq_no`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    /// Flow identifier.
    pub flow_id: FlowId,
    /// Current workflow phase.
    pub current_phase: Phase,
    /// Lifecycle status.
    pub status: FlowStatus,
    /// Optimistic concurrency version, starting at 1.
    pub state_version: u64,
    /// Count of rollback and rework traversals.
    pub round: u32,
    /// Accumulated cost in the budget currency.
    pub budget_used: f64,
    /// Budget cap; non-positive disables budget enforcement.
    pub budget_cap: f64,
    /// Sequence number of the most recent event.
    pub last_event_seq: u64,
    /// Unix seconds of the last update.
    pub updated_at: i64,
}

impl FlowState {
    /// Creates the initial state for a new flow at [`Phase::Intake`].
    #[must_use]
    pub fn initial(flow_id: FlowId, budget_cap: f64, now: i64) -> Self {
        Self {
            flow_id,
            current_phase: Phase::Intake,
            status: FlowStatus::Running,
            state_version: 1,
            round: 0,
            budget_used: 0.0,
            budget_cap,
            last_event_seq: 1,
            updated_at: now,
        }
    }
}

// ============================================================================
// SECTION: Workflow Events
// ============================================================================

/// Payload of a `phase_transition` event.
///
/// # Invariants
/// - `from` and `to` form a legal edge of the phase graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Phase the flow left.
    pub from: Phase,
    /// Phase the flow entered.
    pub to: Phase,
    /// Trigger action that caused the transition.
    pub action: TriggerAction,
    /// Actor that requested the trigger.
    pub actor: String,
}

/// Append-only workflow event.
///
/// # Invariants
/// - `(flow_id, seq_no)` is unique; `seq_no` is dense from 1 per flow.
/// - `payload_hash` is the canonical-JSON SHA-256 digest of `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Flow identifier.
    pub flow_id: FlowId,
    /// Dense per-flow sequence number, starting at 1.
    pub seq_no: u64,
    /// Phase the flow was in when the event was written.
    pub phase: Phase,
    /// Event type label.
    pub event_type: String,
    /// Event payload.
    pub payload: Value,
    /// Canonical-JSON digest of the payload.
    pub payload_hash: String,
    /// Unix seconds when the event was written.
    pub created_at: i64,
}

impl WorkflowEvent {
    /// Creates an event, computing the canonical payload digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashingError`] when the payload cannot be canonically
    /// serialized.
    pub fn new(
        flow_id: FlowId,
        seq_no: u64,
        phase: Phase,
        event_type: impl Into<String>,
        payload: Value,
        created_at: i64,
    ) -> Result<Self, HashingError> {
        let payload_hash = hashing::hash_canonical_json(&payload)?;
        Ok(Self {
            flow_id,
            seq_no,
            phase,
            event_type: event_type.into(),
            payload,
            payload_hash,
            created_at,
        })
    }

    /// Returns true when the stored digest matches the payload.
    #[must_use]
    pub fn verify_payload_hash(&self) -> bool {
        hashing::hash_canonical_json(&self.payload)
            .map(|digest| digest == self.payload_hash)
            .unwrap_or(false)
    }
}

// ============================================================================
// SECTION: Phase Snapshots
// ============================================================================

/// Boundary snapshot captured when a flow enters a phase.
///
/// # Invariants
/// - Keyed by `(flow_id, phase)`; reads use latest-wins semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    /// Flow identifier.
    pub flow_id: FlowId,
    /// Phase the snapshot was captured for.
    pub phase: Phase,
    /// Flow round at capture time.
    pub round: u32,
    /// Snapshot payload.
    pub payload: Value,
    /// Unix seconds when the snapshot was captured.
    pub created_at: i64,
}

// ============================================================================
// SECTION: Workers
// ============================================================================

/// Worker lifecycle state.
///
/// # Invariants
/// - `Done`, `Replaced`, and `HardTimeout` are terminal; transitions out of
///   a terminal state are rejected by the worker manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Worker record exists but has not reported work yet.
    Created,
    /// Worker is actively heartbeating.
    Running,
    /// Worker missed its soft deadline; signaling only.
    SoftTimeout,
    /// Worker missed its hard deadline and was replaced.
    HardTimeout,
    /// Worker was replaced by the supervisor.
    Replaced,
    /// Worker shut down cleanly.
    Done,
}

impl WorkerState {
    /// Returns true for states no worker may leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Replaced | Self::HardTimeout)
    }

    /// Returns true for states that count against the worker limit.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }

    /// Returns a stable snake_case label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::SoftTimeout => "soft_timeout",
            Self::HardTimeout => "hard_timeout",
            Self::Replaced => "replaced",
            Self::Done => "done",
        }
    }

    /// Parses a stable label back into a worker state.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        [
            Self::Created,
            Self::Running,
            Self::SoftTimeout,
            Self::HardTimeout,
            Self::Replaced,
            Self::Done,
        ]
        .into_iter()
        .find(|state| state.as_str() == label)
    }
}

/// Durable record of an ephemeral worker.
///
/// # Invariants
/// - `file_ownership` is advisory; the intent resolver consults it before
///   granting leases.
/// - Timeouts of zero disable the corresponding deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Worker identifier.
    pub worker_id: WorkerId,
    /// Flow the worker belongs to.
    pub flow_id: FlowId,
    /// Phase the worker was spawned for.
    pub phase: Phase,
    /// Provider role the worker runs as.
    pub role: String,
    /// Lifecycle state.
    pub state: WorkerState,
    /// Ordered list of files the worker may reserve.
    pub file_ownership: Vec<String>,
    /// Soft deadline in seconds since the last heartbeat; zero disables.
    pub soft_timeout_sec: i64,
    /// Hard deadline in seconds since the last heartbeat; zero disables.
    pub hard_timeout_sec: i64,
    /// Unix seconds of the last heartbeat.
    pub last_heartbeat: i64,
    /// Unix seconds when the worker was created.
    pub created_at: i64,
}

// ============================================================================
// SECTION: Intents
// ============================================================================

/// Operation an intent reserves a file for.
///
/// # Invariants
/// - Variants are stable for serialization and conflict classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOperation {
    /// Modify an existing file.
    Write,
    /// Create a new file.
    Create,
    /// Delete a file.
    Delete,
    /// Rename a file.
    Rename,
}

impl IntentOperation {
    /// Returns a stable snake_case label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Rename => "rename",
        }
    }

    /// Parses a stable label back into an operation.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        [Self::Write, Self::Create, Self::Delete, Self::Rename]
            .into_iter()
            .find(|operation| operation.as_str() == label)
    }
}

/// Intent lifecycle status.
///
/// # Invariants
/// - `Done` and `Cancelled` are terminal; only `Pending` and `Running`
///   intents hold the per-file lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Lease granted; execution has not started.
    Pending,
    /// Execution in progress.
    Running,
    /// Executed successfully.
    Done,
    /// Lease released without execution.
    Cancelled,
}

impl IntentStatus {
    /// Returns true for statuses that hold the per-file lock.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Returns a stable snake_case label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a stable label back into a status.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        [Self::Pending, Self::Running, Self::Done, Self::Cancelled]
            .into_iter()
            .find(|status| status.as_str() == label)
    }
}

/// File write reservation with a wall-clock lease.
///
/// # Invariants
/// - At most one active intent exists per `(flow_id, target_file)`.
/// - `lease_until` is unix seconds; execution past it fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    /// Intent identifier.
    pub intent_id: IntentId,
    /// Flow the intent belongs to.
    pub flow_id: FlowId,
    /// Worker holding the reservation.
    pub worker_id: WorkerId,
    /// File path the intent reserves.
    pub target_file: String,
    /// Operation the intent will perform.
    pub operation: IntentOperation,
    /// Lifecycle status.
    pub status: IntentStatus,
    /// Content hash expected before execution.
    pub pre_hash: String,
    /// Content hash recorded after execution.
    pub post_hash: String,
    /// Digest of the payload the worker plans to write.
    pub payload_hash: String,
    /// Unix seconds after which the lease is void.
    pub lease_until: i64,
}

// ============================================================================
// SECTION: Audit Records
// ============================================================================

/// Severity attached to an audit record.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine decision.
    Info,
    /// Denial or supervisor-initiated state change.
    Warning,
}

impl AuditSeverity {
    /// Returns a stable snake_case label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }

    /// Parses a stable label back into a severity.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        [Self::Info, Self::Warning].into_iter().find(|severity| severity.as_str() == label)
    }
}

/// Process-wide sequence for audit identifier minting.
static AUDIT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Immutable record of a significant engine decision.
///
/// # Invariants
/// - `audit_id` is unique; records are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Audit identifier, minted as `aud-<nanos>-<seq>`.
    pub audit_id: String,
    /// Flow the decision concerned.
    pub flow_id: FlowId,
    /// Decision kind label (for example `permission_denied`).
    pub kind: String,
    /// Decision severity.
    pub severity: AuditSeverity,
    /// Structured decision detail.
    pub detail: Value,
    /// Unix seconds when the record was written.
    pub created_at: i64,
}

impl AuditRecord {
    /// Creates an audit record with a freshly minted identifier.
    #[must_use]
    pub fn new(
        flow_id: FlowId,
        kind: impl Into<String>,
        severity: AuditSeverity,
        detail: Value,
        now: i64,
    ) -> Self {
        let seq = AUDIT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            audit_id: format!("aud-{}-{seq}", now_nanos()),
            flow_id,
            kind: kind.into(),
            severity,
            detail,
            created_at: now,
        }
    }
}

// ============================================================================
// SECTION: Cost Deltas
// ============================================================================

/// Append-only cost increment reported by a provider session.
///
/// # Invariants
/// - Fields missing from provider payloads default to zero/empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CostDelta {
    /// Flow the cost applies to.
    #[serde(default)]
    pub flow_id: FlowId,
    /// Input tokens consumed.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens produced.
    #[serde(default)]
    pub output_tokens: u64,
    /// Monetary amount in USD.
    #[serde(default)]
    pub amount_usd: f64,
    /// Provider that reported the cost.
    #[serde(default)]
    pub provider: String,
    /// Phase the flow was in when the cost was recorded.
    #[serde(default)]
    pub phase: Option<Phase>,
    /// Unix seconds when the delta was recorded.
    #[serde(default)]
    pub created_at: i64,
}
