// crates/flow-warden-store-sqlite/src/lib.rs
// ============================================================================
// Module: Flow Warden SQLite Store Library
// Description: Durable WorkflowStore backed by SQLite WAL.
// Purpose: Persist workflow state with atomic transactions and hash checks.
// Dependencies: flow-warden-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate implements the [`flow_warden_core::WorkflowStore`] contract on
//! a single SQLite database file. The schema is created idempotently at
//! open; WAL journaling permits concurrent readers while the writer
//! connection serializes all mutations behind a mutex.
//!
//! Security posture: database contents are untrusted; event payload digests
//! are verified on read and loads fail closed on corruption.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SCHEMA_VERSION;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteWorkflowStore;
