// crates/flow-warden-guard/src/permissions.rs
// ============================================================================
// Module: Permission Broker
// Description: Capability sheet construction and request matching.
// Purpose: Decide whether a worker may touch a path or run a command.
// Dependencies: flow-warden-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The broker evaluates one request against a capability sheet in a fixed
//! order: deny patterns first (exact, base-name, wildcard on the full path,
//! wildcard on the base name), then the allowed path prefixes, then the
//! exact command allowlist. Denials are audited with `warning` severity;
//! audit write failures degrade silently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use flow_warden_core::AuditRecord;
use flow_warden_core::AuditSeverity;
use flow_warden_core::CapabilitySheet;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use flow_warden_core::FlowId;
use flow_warden_core::WorkflowStore;
use flow_warden_core::now_unix;
use serde_json::json;

// ============================================================================
// SECTION: Wildcard Matching
// ============================================================================

/// Matches a candidate against a pattern supporting `*` and `?`.
///
/// `*` matches any run of characters (including none); `?` matches exactly
/// one. Matching is byte-wise over UTF-8 and case-sensitive.
#[must_use]
pub fn wildcard_matches(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.as_bytes();
    let candidate = candidate.as_bytes();
    let mut p = 0;
    let mut c = 0;
    let mut star: Option<(usize, usize)> = None;
    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, c));
            p += 1;
        } else if let Some((star_p, star_c)) = star {
            p = star_p + 1;
            c = star_c + 1;
            star = Some((star_p, star_c + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Returns the final path component of a slash-separated path.
fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ============================================================================
// SECTION: Permission Broker
// ============================================================================

/// Capability sheet enforcement point.
///
/// # Invariants
/// - Denials are audited; audit failures never mask the denial.
pub struct PermissionBroker {
    /// Store receiving audit records for denials.
    store: Arc<dyn WorkflowStore>,
}

impl PermissionBroker {
    /// Creates a broker auditing into the provided store.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Builds a capability sheet with the default deny patterns.
    #[must_use]
    pub fn build_capability_sheet(
        &self,
        flow_id: FlowId,
        paths: Vec<String>,
        commands: Vec<String>,
    ) -> CapabilitySheet {
        CapabilitySheet::new(flow_id, paths, commands)
    }

    /// Checks one `(path, command)` request against a sheet.
    ///
    /// # Errors
    ///
    /// Returns `permission_denied` when a deny pattern matches, the path is
    /// outside every allowed prefix, or the command is not allowlisted.
    pub fn check_permission(
        &self,
        sheet: &CapabilitySheet,
        path: &str,
        command: &str,
    ) -> Result<(), EngineError> {
        let base = base_name(path);
        for pattern in &sheet.denied_patterns {
            let hit = pattern == path
                || pattern == base
                || wildcard_matches(pattern, path)
                || wildcard_matches(pattern, base);
            if hit {
                return Err(self.deny(sheet, path, command, &format!("deny pattern {pattern}")));
            }
        }
        if !sheet.allowed_paths.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Err(self.deny(sheet, path, command, "path outside allowed prefixes"));
        }
        if !sheet.allowed_commands.iter().any(|allowed| allowed == command) {
            return Err(self.deny(sheet, path, command, "command not allowlisted"));
        }
        Ok(())
    }

    /// Audits and constructs one denial.
    fn deny(
        &self,
        sheet: &CapabilitySheet,
        path: &str,
        command: &str,
        reason: &str,
    ) -> EngineError {
        let record = AuditRecord::new(
            sheet.flow_id.clone(),
            "permission_denied",
            AuditSeverity::Warning,
            json!({ "path": path, "command": command, "reason": reason }),
            now_unix(),
        );
        if self.store.record_audit(&record).is_err() {
            tracing::warn!(flow = %sheet.flow_id, "audit write failed for permission denial");
        }
        EngineError::new(
            ErrorCode::PermissionDenied,
            format!("request denied for {path}: {reason}"),
        )
    }
}
