// crates/flow-warden-sessions/src/event.rs
// ============================================================================
// Module: Normalized Events
// Description: Provider-agnostic event shape and line parsing.
// Purpose: Turn one stdout line into one normalized event, or skip it.
// Dependencies: flow-warden-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Each provider stdout line is expected to be a JSON object with a
//! non-empty `type` field. Malformed lines are skipped without terminating
//! the session. The payload of a normalized event is an independent owned
//! copy of the line, so later reuse of the reader's buffer can never alter
//! an event already emitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use flow_warden_core::SessionId;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Event type providers use to report spend.
pub const EVENT_TYPE_COST: &str = "cost";

/// Provider-agnostic shape of one parsed stdout line.
///
/// # Invariants
/// - `payload` is an independent copy of the source line bytes.
/// - `event_type` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Value of the line's `type` field.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Provider that emitted the line.
    pub provider: String,
    /// Session the line arrived on.
    pub session_id: SessionId,
    /// Owned copy of the raw line.
    pub payload: String,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Minimal view of a line used to extract the `type` field.
#[derive(Deserialize)]
struct LineEnvelope {
    /// Event type field; absent or empty lines are skipped.
    #[serde(rename = "type", default)]
    event_type: String,
}

/// Parses one stdout line into a normalized event.
///
/// Returns `None` for lines that are not JSON objects or that lack a
/// non-empty `type` field; callers skip those lines.
#[must_use]
pub fn parse_event(provider: &str, session_id: &SessionId, line: &str) -> Option<NormalizedEvent> {
    let envelope: LineEnvelope = serde_json::from_str(line).ok()?;
    if envelope.event_type.is_empty() {
        return None;
    }
    Some(NormalizedEvent {
        event_type: envelope.event_type,
        provider: provider.to_string(),
        session_id: session_id.clone(),
        payload: line.to_string(),
    })
}
