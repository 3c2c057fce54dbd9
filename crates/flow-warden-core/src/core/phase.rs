// crates/flow-warden-core/src/core/phase.rs
// ============================================================================
// Module: Phase Graph
// Description: The seven-phase workflow graph and its trigger actions.
// Purpose: Define legal transitions, including the two explicit back-edges.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The workflow is a directed graph of seven phases with a single forward
//! chain and two back-edges:
//!
//! ```text
//! Intake → Planning → Implementation → Verification → Review → Consensus → Complete
//!                            ↑              ↓
//!                            └──────────────┘   (rollback)
//!                                         Review ← Consensus   (rework)
//! ```
//!
//! Invariants:
//! - `is_valid_transition` is the single source of truth for legality.
//! - Rollback is only legal from Verification; rework only from Consensus.
//! - No forward transition is defined from Complete.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Phase
// ============================================================================

/// A coarse step in the seven-phase review workflow.
///
/// # Invariants
/// - Variants are stable for serialization and event payloads.
/// - Ordering follows the forward chain of the workflow graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Task intake and scoping.
    Intake,
    /// Planning and decomposition.
    Planning,
    /// Producer implementation work.
    Implementation,
    /// Mechanical verification of the produced change.
    Verification,
    /// Independent reviewer passes.
    Review,
    /// Weighted consensus over review scorecards.
    Consensus,
    /// Terminal phase; the flow is complete.
    Complete,
}

impl Phase {
    /// All phases in forward order.
    pub const ALL: [Self; 7] = [
        Self::Intake,
        Self::Planning,
        Self::Implementation,
        Self::Verification,
        Self::Review,
        Self::Consensus,
        Self::Complete,
    ];

    /// Returns the next forward phase, or `None` from [`Phase::Complete`].
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Intake => Some(Self::Planning),
            Self::Planning => Some(Self::Implementation),
            Self::Implementation => Some(Self::Verification),
            Self::Verification => Some(Self::Review),
            Self::Review => Some(Self::Consensus),
            Self::Consensus => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Returns a stable snake_case label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Planning => "planning",
            Self::Implementation => "implementation",
            Self::Verification => "verification",
            Self::Review => "review",
            Self::Consensus => "consensus",
            Self::Complete => "complete",
        }
    }

    /// Parses a stable label back into a phase.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.as_str() == label)
    }

    /// Returns true when the flow is allowed to move from `from` to `to`.
    ///
    /// Legal edges are the six forward edges plus the rollback edge
    /// (Verification → Implementation) and the rework edge
    /// (Consensus → Review).
    #[must_use]
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        if from.next() == Some(to) {
            return true;
        }
        matches!(
            (from, to),
            (Self::Verification, Self::Implementation) | (Self::Consensus, Self::Review)
        )
    }

    /// Returns true when the `from → to` edge increments the flow round.
    ///
    /// Only the two back-edges count toward the round budget.
    #[must_use]
    pub fn is_back_edge(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Verification, Self::Implementation) | (Self::Consensus, Self::Review)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Trigger Actions
// ============================================================================

/// Trigger actions accepted by the workflow engine.
///
/// # Invariants
/// - Variants are stable for serialization and event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    /// Move to the next forward phase.
    Advance,
    /// Roll back from Verification to Implementation.
    Rollback,
    /// Send the flow from Consensus back to Review for rework.
    Rework,
}

impl TriggerAction {
    /// Returns a stable snake_case label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Rollback => "rollback",
            Self::Rework => "rework",
        }
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
