// crates/flow-warden-core/src/runtime/consensus.rs
// ============================================================================
// Module: Review Consensus
// Description: Scorecard validation, weighted aggregation, blocker checks.
// Purpose: Fold reviewer scorecards into a single gate-facing verdict.
// Dependencies: crate::core::review, crate::errors
// ============================================================================

//! ## Overview
//! Three cooperating pieces: the schema validator collects every violation
//! in a card and surfaces them as one structured error; the consensus
//! engine folds validated cards into a weighted final score and verdict;
//! the blocker checker extracts the conditions that must keep the review
//! phase closed (critical dimensions at 2 or below, any P0 issue).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::review::IssueSeverity;
use crate::core::review::ScoreCard;
use crate::core::review::Verdict;
use crate::errors::EngineError;
use crate::errors::ErrorCode;

// ============================================================================
// SECTION: Thresholds and Weights
// ============================================================================

/// Final score at or above which consensus passes outright.
pub const PASS_THRESHOLD: f64 = 4.0;
/// Final score at or above which consensus passes conditionally.
pub const CONDITIONAL_THRESHOLD: f64 = 3.0;
/// Critical dimension value at or below which a blocker is raised.
pub const CRITICAL_SCORE_FLOOR: i8 = 2;

/// Returns the default reviewer weight map.
#[must_use]
pub fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("primary".to_string(), 0.45),
        ("secondary".to_string(), 0.25),
        ("lead".to_string(), 0.30),
    ])
}

// ============================================================================
// SECTION: Schema Validation
// ============================================================================

/// Validator enforcing the scorecard schema.
///
/// # Invariants
/// - All violations in a card are collected before the error is raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a scorecard, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns `score_card_invalid` carrying one blocker per violation.
    pub fn validate(&self, card: &ScoreCard) -> Result<(), EngineError> {
        let mut violations = Vec::new();
        if card.review_id.as_str().is_empty() {
            violations.push("review_id must not be empty".to_string());
        }
        if card.reviewer.trim().is_empty() {
            violations.push("reviewer must not be empty".to_string());
        }
        for (dimension, value) in [
            ("correctness", card.scores.correctness),
            ("security", card.scores.security),
            ("maintainability", card.scores.maintainability),
            ("cost", card.scores.cost),
            ("delivery_risk", card.scores.delivery_risk),
        ] {
            if !(1..=5).contains(&value) {
                violations.push(format!("score {dimension} {value} is outside [1, 5]"));
            }
        }
        for (index, issue) in card.issues.iter().enumerate() {
            if issue.location.trim().is_empty() {
                violations.push(format!("issue {index} has an empty location"));
            }
            if issue.description.trim().is_empty() {
                violations.push(format!("issue {index} has an empty description"));
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::with_blockers(
                ErrorCode::ScoreCardInvalid,
                format!("scorecard {} failed validation", card.review_id),
                violations,
            ))
        }
    }
}

// ============================================================================
// SECTION: Consensus Engine
// ============================================================================

/// Consensus outcome over a set of validated scorecards.
///
/// # Invariants
/// - `final_score` is the weight-normalized mean of per-card averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// Weighted final score.
    pub final_score: f64,
    /// Verdict derived from the final score.
    pub verdict: Verdict,
    /// Number of cards aggregated.
    pub card_count: usize,
}

/// Weighted scorecard aggregator.
///
/// # Invariants
/// - Unknown reviewers weigh 1.0.
/// - Every card is schema-validated before aggregation.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    /// Reviewer name to weight.
    weights: BTreeMap<String, f64>,
    /// Validator applied to every card.
    validator: SchemaValidator,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(default_weights())
    }
}

impl ConsensusEngine {
    /// Creates an engine with the provided weight map.
    #[must_use]
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self { weights, validator: SchemaValidator::new() }
    }

    /// Aggregates scorecards into a weighted verdict.
    ///
    /// # Errors
    ///
    /// Returns `consensus_no_cards` on empty input and `score_card_invalid`
    /// when any card fails validation.
    pub fn evaluate(&self, cards: &[ScoreCard]) -> Result<ConsensusOutcome, EngineError> {
        if cards.is_empty() {
            return Err(EngineError::new(
                ErrorCode::ConsensusNoCards,
                "consensus requires at least one scorecard",
            ));
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for card in cards {
            self.validator.validate(card)?;
            let weight = self.weights.get(&card.reviewer).copied().unwrap_or(1.0);
            weighted_sum += card.scores.average() * weight;
            weight_total += weight;
        }
        let final_score = weighted_sum / weight_total;
        let verdict = if final_score >= PASS_THRESHOLD {
            Verdict::Pass
        } else if final_score >= CONDITIONAL_THRESHOLD {
            Verdict::ConditionalPass
        } else {
            Verdict::Fail
        };
        Ok(ConsensusOutcome { final_score, verdict, card_count: cards.len() })
    }
}

// ============================================================================
// SECTION: Blocker Checker
// ============================================================================

/// Extractor of phase-blocking review conditions.
///
/// # Invariants
/// - A reason is emitted per triggered condition per card.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockerChecker;

impl BlockerChecker {
    /// Creates a checker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns whether the cards block phase exit, with the reasons.
    ///
    /// Blocking conditions: correctness at or below 2, security at or below
    /// 2, or any P0 issue.
    #[must_use]
    pub fn check(&self, cards: &[ScoreCard]) -> (bool, Vec<String>) {
        let mut reasons = Vec::new();
        for card in cards {
            if card.scores.correctness <= CRITICAL_SCORE_FLOOR {
                reasons.push(format!(
                    "reviewer {} reported correctness score {}",
                    card.reviewer, card.scores.correctness
                ));
            }
            if card.scores.security <= CRITICAL_SCORE_FLOOR {
                reasons.push(format!(
                    "reviewer {} reported security score {}",
                    card.reviewer, card.scores.security
                ));
            }
            for issue in &card.issues {
                if issue.severity == IssueSeverity::P0 {
                    reasons.push(format!(
                        "reviewer {} reported P0 at {}: {}",
                        card.reviewer, issue.location, issue.description
                    ));
                }
            }
        }
        (!reasons.is_empty(), reasons)
    }
}
