// crates/flow-warden-config/tests/config_validation.rs
// ============================================================================
// Module: Configuration Validation Tests
// Description: Load, default, and per-field boundary validation.
// ============================================================================
//! ## Overview
//! Validates TOML loading, default application, and that each invalid
//! field is rejected with an error naming it.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io::Write;

use flow_warden_config::ConfigError;
use flow_warden_config::DEFAULT_CHECK_INTERVAL_SEC;
use flow_warden_config::DEFAULT_HEARTBEAT_MAX_AGE_SEC;
use flow_warden_config::DEFAULT_LISTEN_ADDR;
use flow_warden_config::DEFAULT_MAX_ROUNDS;
use flow_warden_config::WardenConfig;
use flow_warden_core::EngineError;
use flow_warden_core::ErrorCode;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const MINIMAL: &str = r#"
database_path = "warden.db"
workspace_path = "workspace"
budget_cap = 100.0

[providers.builder]
command = "agent-builder"
args = ["--stream"]
"#;

fn assert_invalid_field(raw: &str, field: &str) {
    match WardenConfig::from_toml_str(raw) {
        Err(ConfigError::Invalid { field: named, .. }) => {
            assert_eq!(named, field, "wrong field named");
        }
        other => panic!("expected invalid {field}, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Loading and Defaults
// ============================================================================

#[test]
fn minimal_document_loads_with_defaults() {
    let config = WardenConfig::from_toml_str(MINIMAL).expect("load");
    assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    assert_eq!(config.check_interval_sec, DEFAULT_CHECK_INTERVAL_SEC);
    assert_eq!(config.heartbeat_max_age_sec, DEFAULT_HEARTBEAT_MAX_AGE_SEC);
    assert_eq!(config.max_rounds, DEFAULT_MAX_ROUNDS);
    assert_eq!(config.providers.len(), 1);
    let builder = config.providers.get("builder").expect("builder");
    assert_eq!(builder.command, "agent-builder");
    assert_eq!(builder.args, vec!["--stream"]);
    assert!(builder.env.is_empty());
}

#[test]
fn load_reads_a_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(MINIMAL.as_bytes()).expect("write");
    let config = WardenConfig::load(file.path()).expect("load");
    assert!((config.budget_cap - 100.0).abs() < f64::EPSILON);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = WardenConfig::load(std::path::Path::new("/nonexistent/warden.toml"))
        .expect_err("must fail");
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = WardenConfig::from_toml_str("database_path = [").expect_err("must fail");
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn config_errors_map_to_the_config_invalid_code() {
    let err = WardenConfig::from_toml_str(MINIMAL.replace("100.0", "0.0").as_str())
        .expect_err("must fail");
    let engine: EngineError = err.into();
    assert_eq!(engine.code, ErrorCode::ConfigInvalid);
}

// ============================================================================
// SECTION: Field Boundaries
// ============================================================================

#[test]
fn empty_database_path_is_rejected() {
    assert_invalid_field(&MINIMAL.replace(r#""warden.db""#, r#""""#), "database_path");
}

#[test]
fn empty_workspace_path_is_rejected() {
    assert_invalid_field(&MINIMAL.replace(r#""workspace""#, r#""""#), "workspace_path");
}

#[test]
fn non_positive_budget_cap_is_rejected() {
    assert_invalid_field(&MINIMAL.replace("100.0", "0.0"), "budget_cap");
    assert_invalid_field(&MINIMAL.replace("100.0", "-3.5"), "budget_cap");
}

#[test]
fn bad_listen_addr_is_rejected() {
    let raw = format!("{MINIMAL}\nlisten_addr = \"not-an-addr\"\n");
    assert_invalid_field(&raw, "listen_addr");
}

#[test]
fn zero_check_interval_is_rejected() {
    let raw = format!("{MINIMAL}\ncheck_interval_sec = 0\n");
    assert_invalid_field(&raw, "check_interval_sec");
}

#[test]
fn zero_heartbeat_age_is_rejected() {
    let raw = format!("{MINIMAL}\nheartbeat_max_age_sec = 0\n");
    assert_invalid_field(&raw, "heartbeat_max_age_sec");
}

#[test]
fn zero_worker_limit_is_rejected() {
    let raw = format!("{MINIMAL}\nmax_concurrent_workers = 0\n");
    assert_invalid_field(&raw, "max_concurrent_workers");
}

#[test]
fn zero_rate_limit_is_rejected() {
    let raw = format!("{MINIMAL}\nrate_limit_per_minute = 0\n");
    assert_invalid_field(&raw, "rate_limit_per_minute");
}

#[test]
fn at_least_one_provider_is_required() {
    let raw = r#"
database_path = "warden.db"
workspace_path = "workspace"
budget_cap = 100.0
"#;
    assert_invalid_field(raw, "providers");
}

#[test]
fn provider_with_empty_command_is_rejected() {
    let raw = &MINIMAL.replace(r#"command = "agent-builder""#, r#"command = """#);
    assert_invalid_field(raw, "providers.command");
}
