// crates/flow-warden-workers/src/intents.rs
// ============================================================================
// Module: Intent Resolver and Conflict Detector
// Description: File-scoped intent leases, ownership checks, conflicts.
// Purpose: Arbitrate per-file write locks between workers.
// Dependencies: flow-warden-core, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! An intent reserves one file for one planned operation under a wall-clock
//! lease. Acquisition reads first (active holders, worker ownership) and
//! only then writes, keeping lookups outside the store's single write
//! connection. Execution verifies the lease and the pre-image hash before
//! marking the intent done.
//!
//! The conflict detector classifies pairwise collisions on a file; the
//! resolver deliberately refuses to merge them, surfacing the conflict to
//! a higher-level decision authority.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use flow_warden_core::AuditRecord;
use flow_warden_core::AuditSeverity;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::IntentId;
use flow_warden_core::IntentOperation;
use flow_warden_core::IntentRecord;
use flow_warden_core::IntentStatus;
use flow_warden_core::WorkflowStore;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

// ============================================================================
// SECTION: Intent Resolver
// ============================================================================

/// Per-file write lock arbiter.
///
/// # Invariants
/// - Reads precede the write in every acquisition (read-then-begin-then-
///   write discipline).
/// - At most one active intent per `(flow, file)` is ever granted.
pub struct IntentResolver {
    /// Persistence backend.
    store: Arc<dyn WorkflowStore>,
}

impl IntentResolver {
    /// Creates a resolver over the store.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Grants a lease on the intent's target file at wall-clock `now`.
    ///
    /// # Errors
    ///
    /// Returns `intent_conflict` when another active intent holds the file
    /// and `file_ownership` when the worker does not own it;
    /// `worker_not_found` for unknown workers.
    pub fn acquire_lock(
        &self,
        intent: &IntentRecord,
        lease_duration_sec: i64,
        now: i64,
    ) -> Result<IntentRecord, EngineError> {
        let holders =
            self.store.find_active_by_file(&intent.flow_id, &intent.target_file)?;
        if !holders.is_empty() {
            return Err(EngineError::new(
                ErrorCode::IntentConflict,
                format!(
                    "file {} already has an active intent ({})",
                    intent.target_file, holders[0].intent_id
                ),
            ));
        }
        let worker = self.store.get_worker(&intent.worker_id)?;
        if !worker.file_ownership.iter().any(|owned| owned == &intent.target_file) {
            return Err(EngineError::new(
                ErrorCode::FileOwnership,
                format!(
                    "worker {} does not own {}",
                    intent.worker_id, intent.target_file
                ),
            ));
        }
        let mut granted = intent.clone();
        granted.status = IntentStatus::Pending;
        granted.lease_until = now + lease_duration_sec;
        self.store.upsert_intent(&granted)?;
        self.audit(
            &granted.flow_id,
            "lock_acquired",
            json!({
                "intent_id": granted.intent_id.as_str(),
                "target_file": granted.target_file,
                "lease_until": granted.lease_until,
            }),
            now,
        );
        Ok(granted)
    }

    /// Releases a lease without executing the intent.
    ///
    /// # Errors
    ///
    /// Returns `intent_not_found` for unknown ids.
    pub fn release_lock(&self, intent_id: &IntentId, now: i64) -> Result<(), EngineError> {
        let mut intent = self.store.get_intent(intent_id)?;
        intent.status = IntentStatus::Cancelled;
        self.store.upsert_intent(&intent)?;
        self.audit(
            &intent.flow_id,
            "lock_released",
            json!({ "intent_id": intent_id.as_str(), "target_file": intent.target_file }),
            now,
        );
        Ok(())
    }

    /// Executes an intent: verifies lease and pre-image, records the
    /// post-image, and marks the intent done.
    ///
    /// # Errors
    ///
    /// Returns `lease_expired` past the lease, `intent_hash_mismatch` when
    /// the file changed under the intent, and `intent_not_found` for
    /// unknown ids.
    pub fn execute(
        &self,
        intent_id: &IntentId,
        current_hash: &str,
        post_hash: &str,
        now: i64,
    ) -> Result<(), EngineError> {
        let intent = self.store.get_intent(intent_id)?;
        if intent.lease_until < now {
            return Err(EngineError::new(
                ErrorCode::LeaseExpired,
                format!("intent {intent_id} lease expired at {}", intent.lease_until),
            ));
        }
        if intent.pre_hash != current_hash {
            return Err(EngineError::new(
                ErrorCode::IntentHashMismatch,
                format!("intent {intent_id} pre-image does not match {}", intent.target_file),
            ));
        }
        self.store.mark_intent_done(intent_id, post_hash)?;
        self.audit(
            &intent.flow_id,
            "intent_executed",
            json!({ "intent_id": intent_id.as_str(), "target_file": intent.target_file }),
            now,
        );
        Ok(())
    }

    /// Writes an audit record, degrading silently on failure.
    fn audit(&self, flow_id: &FlowId, kind: &str, detail: serde_json::Value, now: i64) {
        let record = AuditRecord::new(flow_id.clone(), kind, AuditSeverity::Info, detail, now);
        if self.store.record_audit(&record).is_err() {
            tracing::warn!(flow = %flow_id, kind, "audit write failed");
        }
    }
}

// ============================================================================
// SECTION: Conflict Detection
// ============================================================================

/// Classification of a pairwise intent collision.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// At least one side deletes the file.
    Delete,
    /// Both sides create the file.
    Create,
    /// Any other overlapping pair.
    Overlap,
}

/// A pairwise conflict between two active intents on one file.
///
/// # Invariants
/// - `first` and `second` are distinct active intents on `target_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConflict {
    /// File both intents target.
    pub target_file: String,
    /// First intent of the pair.
    pub first: IntentId,
    /// Second intent of the pair.
    pub second: IntentId,
    /// Conflict classification.
    pub kind: ConflictKind,
}

/// Detector for overlapping active intents.
///
/// # Invariants
/// - Every unordered pair on a file yields exactly one conflict.
pub struct ConflictDetector {
    /// Persistence backend.
    store: Arc<dyn WorkflowStore>,
}

impl ConflictDetector {
    /// Creates a detector over the store.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Groups active intents by file and emits one conflict per pair.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    pub fn detect(&self, flow_id: &FlowId) -> Result<Vec<FileConflict>, EngineError> {
        let mut by_file: BTreeMap<String, Vec<IntentRecord>> = BTreeMap::new();
        for intent in self.store.list_active_intents(flow_id)? {
            by_file.entry(intent.target_file.clone()).or_default().push(intent);
        }
        let mut conflicts = Vec::new();
        for (target_file, intents) in by_file {
            for left in 0..intents.len() {
                for right in (left + 1)..intents.len() {
                    conflicts.push(FileConflict {
                        target_file: target_file.clone(),
                        first: intents[left].intent_id.clone(),
                        second: intents[right].intent_id.clone(),
                        kind: classify(&intents[left], &intents[right]),
                    });
                }
            }
        }
        Ok(conflicts)
    }

    /// Refuses to merge a conflict; resolution is a policy decision above
    /// this engine.
    ///
    /// # Errors
    ///
    /// Always returns `intent_conflict`.
    pub fn resolve(&self, conflict: &FileConflict) -> Result<(), EngineError> {
        Err(EngineError::new(
            ErrorCode::IntentConflict,
            format!(
                "conflict on {} between {} and {} requires escalation",
                conflict.target_file, conflict.first, conflict.second
            ),
        ))
    }
}

/// Classifies a pair of intents on the same file.
fn classify(first: &IntentRecord, second: &IntentRecord) -> ConflictKind {
    if first.operation == IntentOperation::Delete || second.operation == IntentOperation::Delete {
        ConflictKind::Delete
    } else if first.operation == IntentOperation::Create
        && second.operation == IntentOperation::Create
    {
        ConflictKind::Create
    } else {
        ConflictKind::Overlap
    }
}
