// crates/flow-warden-core/tests/consensus_unit.rs
// ============================================================================
// Module: Review Consensus Tests
// Description: Scorecard validation, weighted aggregation, blocker checks.
// ============================================================================
//! ## Overview
//! Validates schema violation collection, the weighted consensus verdicts,
//! and blocker extraction for critical scores and P0 issues.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use flow_warden_core::BlockerChecker;
use flow_warden_core::ConsensusEngine;
use flow_warden_core::ErrorCode;
use flow_warden_core::Issue;
use flow_warden_core::IssueSeverity;
use flow_warden_core::ReviewId;
use flow_warden_core::SchemaValidator;
use flow_warden_core::ScoreCard;
use flow_warden_core::Scores;
use flow_warden_core::Verdict;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn uniform_scores(value: i8) -> Scores {
    Scores {
        correctness: value,
        security: value,
        maintainability: value,
        cost: value,
        delivery_risk: value,
    }
}

fn card(reviewer: &str, scores: Scores) -> ScoreCard {
    ScoreCard {
        review_id: ReviewId::new(format!("rev-{reviewer}")),
        reviewer: reviewer.to_string(),
        scores,
        issues: Vec::new(),
        alternatives: Vec::new(),
        verdict: Verdict::Pass,
    }
}

fn p0_issue(location: &str) -> Issue {
    Issue {
        severity: IssueSeverity::P0,
        location: location.to_string(),
        description: "unchecked tainted input".to_string(),
        suggestion: "validate before use".to_string(),
        evidence: "request body flows into exec".to_string(),
    }
}

// ============================================================================
// SECTION: Schema Validation
// ============================================================================

#[test]
fn valid_card_passes_validation() {
    let validator = SchemaValidator::new();
    validator.validate(&card("primary", uniform_scores(4))).expect("valid");
}

#[test]
fn violations_are_collected_not_short_circuited() {
    let validator = SchemaValidator::new();
    let mut bad = card("", uniform_scores(4));
    bad.review_id = ReviewId::new("");
    bad.scores.correctness = 0;
    bad.scores.security = 6;

    let err = validator.validate(&bad).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::ScoreCardInvalid);
    assert!(err.blockers.len() >= 4, "expected all violations, got {:?}", err.blockers);
    assert!(err.blockers.iter().any(|violation| violation.contains("review_id")));
    assert!(err.blockers.iter().any(|violation| violation.contains("reviewer")));
    assert!(err.blockers.iter().any(|violation| violation.contains("correctness")));
    assert!(err.blockers.iter().any(|violation| violation.contains("security")));
}

#[test]
fn consensus_rejects_invalid_cards() {
    let engine = ConsensusEngine::default();
    let mut bad = card("primary", uniform_scores(4));
    bad.scores.cost = 9;
    let err = engine.evaluate(&[bad]).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::ScoreCardInvalid);
}

// ============================================================================
// SECTION: Weighted Consensus
// ============================================================================

#[test]
fn empty_input_fails_consensus_no_cards() {
    let engine = ConsensusEngine::default();
    let err = engine.evaluate(&[]).expect_err("must fail");
    assert_eq!(err.code, ErrorCode::ConsensusNoCards);
}

#[test]
fn weighted_score_of_five_three_four_passes() {
    let engine = ConsensusEngine::default();
    let cards = [
        card("primary", uniform_scores(5)),
        card("secondary", uniform_scores(3)),
        card("lead", uniform_scores(4)),
    ];
    let outcome = engine.evaluate(&cards).expect("consensus");
    // 5*0.45 + 3*0.25 + 4*0.30 = 4.2 over a weight total of 1.0.
    assert!((outcome.final_score - 4.2).abs() < 1e-9, "got {}", outcome.final_score);
    assert_eq!(outcome.verdict, Verdict::Pass);
    assert_eq!(outcome.card_count, 3);
}

#[test]
fn unknown_reviewer_defaults_to_unit_weight() {
    let engine = ConsensusEngine::default();
    let cards = [card("guest", uniform_scores(3))];
    let outcome = engine.evaluate(&cards).expect("consensus");
    assert!((outcome.final_score - 3.0).abs() < 1e-9);
    assert_eq!(outcome.verdict, Verdict::ConditionalPass);
}

#[test]
fn low_scores_fail_consensus() {
    let engine = ConsensusEngine::default();
    let cards = [
        card("primary", uniform_scores(2)),
        card("secondary", uniform_scores(3)),
        card("lead", uniform_scores(2)),
    ];
    let outcome = engine.evaluate(&cards).expect("consensus");
    assert_eq!(outcome.verdict, Verdict::Fail);
}

// ============================================================================
// SECTION: Blockers
// ============================================================================

#[test]
fn clean_cards_do_not_block() {
    let checker = BlockerChecker::new();
    let cards = [card("primary", uniform_scores(4))];
    let (blocking, reasons) = checker.check(&cards);
    assert!(!blocking);
    assert!(reasons.is_empty());
}

#[test]
fn security_floor_raises_a_blocker() {
    let checker = BlockerChecker::new();
    let mut low = card("primary", uniform_scores(5));
    low.scores.security = 1;
    let (blocking, reasons) = checker.check(&[low]);
    assert!(blocking);
    assert!(
        reasons.iter().any(|reason| reason.contains("security score 1")),
        "missing security reason: {reasons:?}"
    );
}

#[test]
fn p0_issue_raises_a_blocker_with_location() {
    let checker = BlockerChecker::new();
    let mut flagged = card("lead", uniform_scores(4));
    flagged.issues.push(p0_issue("src/handler.rs:42"));
    let (blocking, reasons) = checker.check(&[flagged]);
    assert!(blocking);
    assert!(reasons.iter().any(|reason| {
        reason.contains("lead") && reason.contains("src/handler.rs:42")
    }));
}

#[test]
fn correctness_floor_raises_a_blocker() {
    let checker = BlockerChecker::new();
    let mut low = card("secondary", uniform_scores(4));
    low.scores.correctness = 2;
    let (blocking, reasons) = checker.check(&[low]);
    assert!(blocking);
    assert!(reasons.iter().any(|reason| reason.contains("correctness score 2")));
}
