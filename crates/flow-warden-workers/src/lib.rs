// crates/flow-warden-workers/src/lib.rs
// ============================================================================
// Module: Flow Warden Workers Library
// Description: Worker lifecycle, supervision, and intent lock management.
// Purpose: Spawn, heartbeat, time out, and replace ephemeral workers, and
//          arbitrate per-file write locks.
// Dependencies: flow-warden-core, serde, serde_json, tokio, tokio-util, tracing
// ============================================================================

//! ## Overview
//! Workers are ephemeral: they are spawned per phase, heartbeat while they
//! work, and are replaced when they miss their hard deadline. Intents are
//! per-file write reservations with wall-clock leases; the resolver enforces
//! single-holder semantics and advisory file ownership.
//!
//! Invariants:
//! - No worker leaves a terminal state.
//! - At most one active intent per `(flow, file)`.
//! - Soft timeouts signal; hard timeouts replace.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod intents;
pub mod manager;
pub mod supervisor;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use intents::ConflictDetector;
pub use intents::ConflictKind;
pub use intents::FileConflict;
pub use intents::IntentResolver;
pub use manager::WorkerManager;
pub use manager::WorkerSpec;
pub use supervisor::Supervisor;
pub use supervisor::TimeoutAction;
pub use supervisor::TimeoutKind;
