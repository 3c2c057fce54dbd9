// crates/flow-warden-server/src/lib.rs
// ============================================================================
// Module: Flow Warden Server Library
// Description: HTTP/SSE surface over the engine assembly.
// Purpose: Expose flows, workers, events, scorecards, and costs over HTTP.
// Dependencies: axum, flow-warden-* crates, tokio, tokio-stream, tokio-util
// ============================================================================

//! ## Overview
//! The server exposes the canonical transport shape of the engine: create
//! flow, get flow, advance flow, list workers, list events since a
//! sequence number, stream events as server-sent events, list scorecards,
//! and summarize cost. Error codes map to HTTP status classes; the event
//! log is served with no gaps and no retractions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod server;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use server::app_router;
pub use server::serve;
pub use state::EngineAssembly;
