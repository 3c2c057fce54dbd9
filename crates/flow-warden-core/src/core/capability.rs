// crates/flow-warden-core/src/core/capability.rs
// ============================================================================
// Module: Capability Sheets and Compaction Slots
// Description: Per-flow allowlists and the phase-boundary context fields.
// Purpose: Define the data the permission broker and compaction gate enforce.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A capability sheet is the per-flow allowlist of paths and commands with
//! deny-pattern overrides; deny always wins. Compaction slots are the nine
//! semantic context fields that must survive a phase boundary before a
//! worker spawn; the validator enforces the mandatory four and richer
//! per-phase policies may tighten it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FlowId;

// ============================================================================
// SECTION: Capability Sheet
// ============================================================================

/// Deny patterns applied to every capability sheet.
pub const DEFAULT_DENY_PATTERNS: [&str; 3] = [".env", "*.key", ".git/*"];

/// Per-flow allowlist of paths and commands with deny overrides.
///
/// # Invariants
/// - `allowed_paths` are prefix-matched; `allowed_commands` exact-matched.
/// - `denied_patterns` take precedence over every allow rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySheet {
    /// Flow the sheet applies to.
    pub flow_id: FlowId,
    /// Path prefixes workers may touch.
    pub allowed_paths: Vec<String>,
    /// Commands workers may run, matched exactly.
    pub allowed_commands: Vec<String>,
    /// Deny patterns (exact, base-name, or wildcard); deny wins.
    pub denied_patterns: Vec<String>,
}

impl CapabilitySheet {
    /// Builds a sheet with the default deny patterns appended.
    #[must_use]
    pub fn new(flow_id: FlowId, paths: Vec<String>, commands: Vec<String>) -> Self {
        Self {
            flow_id,
            allowed_paths: paths,
            allowed_commands: commands,
            denied_patterns: DEFAULT_DENY_PATTERNS.iter().map(ToString::to_string).collect(),
        }
    }
}

// ============================================================================
// SECTION: Compaction Slots
// ============================================================================

/// The nine context fields preserved across a phase boundary.
///
/// # Invariants
/// - Field names are stable for serialization and violation reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionSlots {
    /// What the flow is building.
    #[serde(default)]
    pub task_spec: String,
    /// How completion is judged.
    #[serde(default)]
    pub acceptance_criteria: String,
    /// Phase the flow is currently in.
    #[serde(default)]
    pub current_phase: String,
    /// Unresolved risks carried forward.
    #[serde(default)]
    pub open_risks: String,
    /// Constraints still binding the work.
    #[serde(default)]
    pub active_constraints: String,
    /// Current file ownership map.
    #[serde(default)]
    pub file_ownership: String,
    /// References to produced artifacts.
    #[serde(default)]
    pub artifact_refs: String,
    /// Intents granted but not yet executed.
    #[serde(default)]
    pub pending_intents: String,
    /// What the next phase needs to start.
    #[serde(default)]
    pub next_phase_requirements: String,
}

/// A single missing-slot violation.
///
/// # Invariants
/// - `slot` is one of the nine stable field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotViolation {
    /// Name of the empty slot.
    pub slot: String,
}

impl CompactionSlots {
    /// Slots that must be non-empty before any cross-boundary worker spawn.
    pub const MANDATORY: [&'static str; 4] =
        ["task_spec", "acceptance_criteria", "current_phase", "artifact_refs"];

    /// Returns each slot paired with its stable name.
    #[must_use]
    pub fn named(&self) -> [(&'static str, &str); 9] {
        [
            ("task_spec", self.task_spec.as_str()),
            ("acceptance_criteria", self.acceptance_criteria.as_str()),
            ("current_phase", self.current_phase.as_str()),
            ("open_risks", self.open_risks.as_str()),
            ("active_constraints", self.active_constraints.as_str()),
            ("file_ownership", self.file_ownership.as_str()),
            ("artifact_refs", self.artifact_refs.as_str()),
            ("pending_intents", self.pending_intents.as_str()),
            ("next_phase_requirements", self.next_phase_requirements.as_str()),
        ]
    }

    /// Validates the mandatory slots, returning one violation per empty slot.
    #[must_use]
    pub fn validate(&self) -> Vec<SlotViolation> {
        self.named()
            .into_iter()
            .filter(|(name, value)| {
                Self::MANDATORY.contains(name) && value.trim().is_empty()
            })
            .map(|(name, _)| SlotViolation { slot: name.to_string() })
            .collect()
    }
}
