// crates/flow-warden-core/tests/proptest_phase.rs
// ============================================================================
// Module: Phase Graph Property Tests
// Description: Exhaustive and generated checks over the transition relation.
// ============================================================================
//! ## Overview
//! The legal edge set is exactly the six forward edges plus the two
//! back-edges; round increments happen only on the back-edges; event
//! payload digests are stable under canonical re-serialization.

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

use flow_warden_core::FlowId;
use flow_warden_core::Phase;
use flow_warden_core::WorkflowEvent;
use flow_warden_core::hashing;
use proptest::prelude::any;
use proptest::prelude::prop;
use proptest::prelude::proptest;
use proptest::sample::select;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Edge Set
// ============================================================================

#[test]
fn legal_edge_set_is_exactly_eight() {
    let mut legal = Vec::new();
    for from in Phase::ALL {
        for to in Phase::ALL {
            if Phase::is_valid_transition(from, to) {
                legal.push((from, to));
            }
        }
    }
    assert_eq!(legal.len(), 8);
    assert!(legal.contains(&(Phase::Intake, Phase::Planning)));
    assert!(legal.contains(&(Phase::Verification, Phase::Implementation)));
    assert!(legal.contains(&(Phase::Consensus, Phase::Review)));
    assert!(!legal.contains(&(Phase::Complete, Phase::Intake)));
}

#[test]
fn back_edges_are_the_only_round_increments() {
    for from in Phase::ALL {
        for to in Phase::ALL {
            let back = Phase::is_back_edge(from, to);
            let expected = matches!(
                (from, to),
                (Phase::Verification, Phase::Implementation) | (Phase::Consensus, Phase::Review)
            );
            assert_eq!(back, expected, "{from} -> {to}");
        }
    }
}

#[test]
fn phase_labels_round_trip() {
    for phase in Phase::ALL {
        assert_eq!(Phase::parse(phase.as_str()), Some(phase));
    }
    assert_eq!(Phase::parse("unknown"), None);
}

// ============================================================================
// SECTION: Generated Properties
// ============================================================================

proptest! {
    #[test]
    fn back_edges_imply_validity(
        from in select(Phase::ALL.to_vec()),
        to in select(Phase::ALL.to_vec()),
    ) {
        if Phase::is_back_edge(from, to) {
            assert!(Phase::is_valid_transition(from, to));
        }
    }

    #[test]
    fn forward_edges_never_increment_round(from in select(Phase::ALL.to_vec())) {
        if let Some(next) = from.next() {
            assert!(Phase::is_valid_transition(from, next));
            assert!(!Phase::is_back_edge(from, next));
        }
    }

    #[test]
    fn event_payload_digest_is_stable(
        keys in prop::collection::vec("[a-z]{1,8}", 0..5),
        values in prop::collection::vec(any::<i64>(), 0..5),
    ) {
        let mut payload = serde_json::Map::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            payload.insert(key.clone(), json!(value));
        }
        let payload = Value::Object(payload);
        let event = WorkflowEvent::new(
            FlowId::new("prop"),
            1,
            Phase::Intake,
            "flow_started",
            payload.clone(),
            0,
        ).expect("event");
        assert!(event.verify_payload_hash());
        assert_eq!(
            event.payload_hash,
            hashing::hash_canonical_json(&payload).expect("digest"),
        );
    }
}
