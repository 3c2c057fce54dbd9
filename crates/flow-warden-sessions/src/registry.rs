// crates/flow-warden-sessions/src/registry.rs
// ============================================================================
// Module: Provider Registry
// Description: Name-keyed registry of provider launch specifications.
// Purpose: Resolve provider names to commands, argv, and environments.
// Dependencies: flow-warden-core, serde
// ============================================================================

//! ## Overview
//! Providers register once at startup under a unique name. Registration of
//! a taken name and lookup of an unknown name both surface
//! `provider_unavailable`; listing returns names lexicographically sorted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Provider Spec
// ============================================================================

/// Launch specification for one provider.
///
/// # Invariants
/// - `name` is unique within a registry.
/// - `env` entries may be overridden per session (session wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Registry name of the provider.
    pub name: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
    /// Base environment for every session of this provider.
    pub env: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Name-keyed provider registry.
///
/// # Invariants
/// - The mutex is leaf-level and never held across I/O.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered specs keyed by name.
    specs: Mutex<BTreeMap<String, ProviderSpec>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider spec under its name.
    ///
    /// # Errors
    ///
    /// Returns `provider_unavailable` when the name is already registered.
    pub fn register(&self, spec: ProviderSpec) -> Result<(), EngineError> {
        let mut specs = self.specs.lock().unwrap_or_else(PoisonError::into_inner);
        if specs.contains_key(&spec.name) {
            return Err(EngineError::new(
                ErrorCode::ProviderUnavailable,
                format!("provider {} is already registered", spec.name),
            ));
        }
        specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Returns the spec registered under a name.
    ///
    /// # Errors
    ///
    /// Returns `provider_unavailable` for unknown names.
    pub fn get(&self, name: &str) -> Result<ProviderSpec, EngineError> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                EngineError::new(
                    ErrorCode::ProviderUnavailable,
                    format!("provider {name} is not registered"),
                )
            })
    }

    /// Lists registered names lexicographically sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
