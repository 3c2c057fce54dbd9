// crates/flow-warden-core/src/core/time.rs
// ============================================================================
// Module: Wall Clock Helpers
// Description: Unix-epoch clock reads used for timestamps and id minting.
// Purpose: Keep clock access in one place so call sites stay uniform.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Flow Warden timestamps are unix seconds stored as `i64`. Components that
//! must be testable against a fake clock (supervisor ticks, lease expiry,
//! rate windows) accept an explicit `now` parameter instead of reading the
//! clock themselves; these helpers serve the remaining call sites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Clock Reads
// ============================================================================

/// Returns the current unix time in whole seconds.
///
/// Clamps to zero for clocks before the epoch and to `i64::MAX` past it.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Returns the current unix time in nanoseconds for id minting.
///
/// Clamps to zero for clocks before the epoch.
#[must_use]
pub fn now_nanos() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_nanos())
}
