// crates/flow-warden-core/src/core/review.rs
// ============================================================================
// Module: Review Scorecards
// Description: Scorecard, score dimensions, issues, and verdicts.
// Purpose: Define the reviewer output consumed by the consensus engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Reviewers submit scorecards: five integer dimensions in [1, 5], a list of
//! issues with severities, optional alternatives, and a verdict. The schema
//! validator in `runtime::consensus` enforces the ranges; these types only
//! carry the data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ReviewId;

// ============================================================================
// SECTION: Scores
// ============================================================================

/// The five review dimensions, each an integer in [1, 5].
///
/// # Invariants
/// - Ranges are enforced by the schema validator, not by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    /// Correctness of the change.
    pub correctness: i8,
    /// Security posture of the change.
    pub security: i8,
    /// Maintainability of the change.
    pub maintainability: i8,
    /// Cost efficiency of the change.
    pub cost: i8,
    /// Delivery risk of the change.
    pub delivery_risk: i8,
}

impl Scores {
    /// Returns all five dimensions in declaration order.
    #[must_use]
    pub const fn dimensions(self) -> [i8; 5] {
        [self.correctness, self.security, self.maintainability, self.cost, self.delivery_risk]
    }

    /// Returns the unweighted mean of the five dimensions.
    #[must_use]
    pub fn average(self) -> f64 {
        let total: i32 = self.dimensions().iter().copied().map(i32::from).sum();
        f64::from(total) / 5.0
    }
}

// ============================================================================
// SECTION: Issues
// ============================================================================

/// Issue severity ladder.
///
/// # Invariants
/// - Variants are stable for serialization; `P0` blocks phase exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSeverity {
    /// Must fix before the flow may proceed.
    P0,
    /// Should fix before completion.
    P1,
    /// Worth noting.
    P2,
}

impl IssueSeverity {
    /// Returns a stable label for the severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reviewer-reported issue.
///
/// # Invariants
/// - `location` is a free-form file/line reference; not validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue severity.
    pub severity: IssueSeverity,
    /// Where the issue lives.
    pub location: String,
    /// What is wrong.
    pub description: String,
    /// Suggested remedy.
    pub suggestion: String,
    /// Evidence supporting the finding.
    pub evidence: String,
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Reviewer verdict over the change.
///
/// # Invariants
/// - Variants are stable for serialization and consensus mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The change is acceptable as-is.
    Pass,
    /// The change is acceptable with follow-ups.
    ConditionalPass,
    /// The change must not land.
    Fail,
}

impl Verdict {
    /// Returns a stable snake_case label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::ConditionalPass => "conditional_pass",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Scorecard
// ============================================================================

/// A complete reviewer scorecard.
///
/// # Invariants
/// - `review_id` is unique; `reviewer` keys the consensus weight map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Review identifier.
    pub review_id: ReviewId,
    /// Reviewer role name (for example `primary`, `secondary`, `lead`).
    pub reviewer: String,
    /// The five score dimensions.
    pub scores: Scores,
    /// Reviewer-reported issues.
    pub issues: Vec<Issue>,
    /// Alternative approaches worth considering.
    pub alternatives: Vec<String>,
    /// Overall verdict.
    pub verdict: Verdict,
}
