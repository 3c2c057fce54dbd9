// crates/flow-warden-guard/src/lib.rs
// ============================================================================
// Module: Flow Warden Guard Library
// Description: Permission broker, rate limiter, and composite guard.
// Purpose: Enforce capability sheets, rate windows, and round caps.
// Dependencies: flow-warden-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The guard crate enforces the request-time policy chain: budget first,
//! then the capability sheet, then the per-flow sliding rate window, then
//! the round cap. The first failing check wins and is surfaced unchanged.
//!
//! Invariants:
//! - Deny patterns take precedence over every allow rule.
//! - Rate state is process-local and intentionally non-durable.
//!
//! Security posture: paths and commands are untrusted caller input; the
//! broker never touches the filesystem, it only matches strings.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod guard;
pub mod permissions;
pub mod rate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use guard::Guard;
pub use guard::GuardConfig;
pub use permissions::PermissionBroker;
pub use permissions::wildcard_matches;
pub use rate::RateLimiter;
