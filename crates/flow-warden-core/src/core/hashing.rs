// crates/flow-warden-core/src/core/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: Canonical JSON serialization and SHA-256 digests.
// Purpose: Provide the tamper-evident payload digests stored with events.
// Dependencies: serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Workflow event payloads are persisted together with a digest of their
//! canonical JSON form (RFC 8785 via `serde_jcs`). Loads recompute and
//! compare the digest and fail closed on mismatch, so a tampered event log
//! is detected rather than replayed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Hashing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashingError {
    /// Canonical JSON serialization failed.
    #[error("canonical json failure: {0}")]
    Canonicalize(String),
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Returns the lowercase hex SHA-256 digest of the provided bytes.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push(hex_digit(byte >> 4));
        out.push(hex_digit(byte & 0x0f));
    }
    out
}

/// Serializes a JSON value into canonical (JCS) bytes.
///
/// # Errors
///
/// Returns [`HashingError::Canonicalize`] when the value cannot be
/// canonically serialized.
pub fn canonical_json_bytes(value: &Value) -> Result<Vec<u8>, HashingError> {
    serde_jcs::to_vec(value).map_err(|err| HashingError::Canonicalize(err.to_string()))
}

/// Hashes a JSON value over its canonical serialization.
///
/// # Errors
///
/// Returns [`HashingError::Canonicalize`] when the value cannot be
/// canonically serialized.
pub fn hash_canonical_json(value: &Value) -> Result<String, HashingError> {
    Ok(hash_bytes(&canonical_json_bytes(value)?))
}

/// Maps a nibble to its lowercase hex digit.
const fn hex_digit(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'a' + (nibble - 10)) as char,
    }
}
