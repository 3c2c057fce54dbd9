// crates/flow-warden-sessions/src/lib.rs
// ============================================================================
// Module: Flow Warden Sessions Library
// Description: Provider subprocess sessions and the engine bridge.
// Purpose: Launch providers, normalize their event streams, fold costs.
// Dependencies: flow-warden-core, flow-warden-guard, serde, serde_json,
//               tokio, tokio-util, tracing
// ============================================================================

//! ## Overview
//! Providers are child processes speaking newline-delimited JSON on stdout.
//! The session manager launches them, owns one stdout reader per session,
//! and surfaces normalized events on a bounded channel. The bridge marries
//! sessions to the engine: budget precheck before launch, cost folding into
//! the governor and the durable delta log before events are forwarded.
//!
//! Invariants:
//! - Event payloads are independent copies of the source line bytes.
//! - Per session, events are delivered in stdout line order.
//! - `stop` is idempotent per session; the second call reports
//!   `session_not_found` without side effects beyond logging.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bridge;
pub mod event;
pub mod registry;
pub mod session;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bridge::Bridge;
pub use event::EVENT_TYPE_COST;
pub use event::NormalizedEvent;
pub use event::parse_event;
pub use registry::ProviderRegistry;
pub use registry::ProviderSpec;
pub use session::EVENT_CHANNEL_CAPACITY;
pub use session::SessionConfig;
pub use session::SessionManager;
