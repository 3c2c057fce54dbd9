// crates/flow-warden-config/src/lib.rs
// ============================================================================
// Module: Flow Warden Configuration
// Description: Canonical TOML configuration model and validation.
// Purpose: Load and validate the engine's construction parameters.
// Dependencies: flow-warden-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! The engine is constructed from one TOML document: database and workspace
//! paths, the budget cap, the listen address, supervision and guard
//! tunables, and the provider map. Required fields are the database path,
//! the workspace path, a positive budget cap, and at least one provider;
//! everything else carries a documented default. Invalid configuration
//! yields `config_invalid` naming the offending field.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default listen address for the HTTP surface.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7177";
/// Default supervision tick period in seconds.
pub const DEFAULT_CHECK_INTERVAL_SEC: u64 = 10;
/// Default heartbeat age threshold in seconds.
pub const DEFAULT_HEARTBEAT_MAX_AGE_SEC: i64 = 30;
/// Default per-flow active worker limit.
pub const DEFAULT_MAX_CONCURRENT_WORKERS: usize = 4;
/// Default per-flow round cap.
pub const DEFAULT_MAX_ROUNDS: u32 = 3;
/// Default per-flow request budget per 60-second window.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;

/// Returns the default listen address.
fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// Returns the default supervision tick period.
const fn default_check_interval_sec() -> u64 {
    DEFAULT_CHECK_INTERVAL_SEC
}

/// Returns the default heartbeat age threshold.
const fn default_heartbeat_max_age_sec() -> i64 {
    DEFAULT_HEARTBEAT_MAX_AGE_SEC
}

/// Returns the default active worker limit.
const fn default_max_concurrent_workers() -> usize {
    DEFAULT_MAX_CONCURRENT_WORKERS
}

/// Returns the default round cap.
const fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

/// Returns the default rate limit.
const fn default_rate_limit_per_minute() -> u32 {
    DEFAULT_RATE_LIMIT_PER_MINUTE
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - `Invalid` names the offending field so operators can fix it directly.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("config read failure: {0}")]
    Io(String),
    /// Document is not valid TOML for the expected shape.
    #[error("config parse failure: {0}")]
    Parse(String),
    /// A field failed validation.
    #[error("config field {field} is invalid: {reason}")]
    Invalid {
        /// Offending field path.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<ConfigError> for EngineError {
    fn from(error: ConfigError) -> Self {
        Self::new(ErrorCode::ConfigInvalid, error.to_string())
    }
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Launch configuration for one provider.
///
/// # Invariants
/// - `command` is non-empty after validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Executable to launch.
    pub command: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Base environment for sessions of this provider.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Top-level engine configuration.
///
/// # Invariants
/// - Validated values satisfy the bounds documented per field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WardenConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Path to the workspace root workers operate in.
    pub workspace_path: PathBuf,
    /// Per-flow budget cap; must be positive.
    pub budget_cap: f64,
    /// HTTP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Supervision tick period in seconds.
    #[serde(default = "default_check_interval_sec")]
    pub check_interval_sec: u64,
    /// Heartbeat age threshold in seconds.
    #[serde(default = "default_heartbeat_max_age_sec")]
    pub heartbeat_max_age_sec: i64,
    /// Per-flow active worker limit.
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,
    /// Per-flow round cap.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Per-flow request budget per 60-second window.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Provider map keyed by role name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl WardenConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document cannot be parsed or a
    /// field fails validation.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every field against its documented bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "database_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.workspace_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "workspace_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.budget_cap <= 0.0 || self.budget_cap.is_nan() {
            return Err(ConfigError::Invalid {
                field: "budget_cap",
                reason: format!("must be positive, got {}", self.budget_cap),
            });
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid {
                field: "listen_addr",
                reason: format!("not a socket address: {}", self.listen_addr),
            });
        }
        if self.check_interval_sec == 0 {
            return Err(ConfigError::Invalid {
                field: "check_interval_sec",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.heartbeat_max_age_sec <= 0 {
            return Err(ConfigError::Invalid {
                field: "heartbeat_max_age_sec",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_workers",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit_per_minute",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid {
                field: "providers",
                reason: "at least one provider is required".to_string(),
            });
        }
        for (name, provider) in &self.providers {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "providers",
                    reason: "provider names must not be empty".to_string(),
                });
            }
            if provider.command.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "providers.command",
                    reason: format!("provider {name} has an empty command"),
                });
            }
        }
        Ok(())
    }
}
