//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use ptymux::cli::{parse_args_from, Args};
use ptymux::config::{Config, ConfigError};
use ptymux::Geometry;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("ptymux")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.shell.is_none());
    assert!(result.rows.is_none());
    assert!(result.cols.is_none());
    assert!(result.config.is_none());
    assert!(result.log_level.is_none());
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-s",
        "/bin/bash",
        "--rows",
        "40",
        "--cols",
        "120",
        "-l",
        "debug",
        "-c",
        "/etc/ptymux.json",
    ]))
    .unwrap();

    assert_eq!(result.shell, Some("/bin/bash".to_string()));
    assert_eq!(result.rows, Some(40));
    assert_eq!(result.cols, Some(120));
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert_eq!(
        result.config.unwrap().to_str().unwrap(),
        "/etc/ptymux.json"
    );
}

#[test]
fn test_cli_invalid_rows() {
    assert!(parse_args_from(args(&["--rows", "tall"])).is_err());
    assert!(parse_args_from(args(&["--rows", "0"])).is_err());
}

#[test]
fn test_cli_missing_value() {
    assert!(parse_args_from(args(&["--shell"])).is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let file = config_file(
        r#"{
        "shell": {
            "program": "/bin/sh",
            "args": ["-i"],
            "env": {"TERM": "xterm-256color", "PS1": "$ "},
            "cwd": "/tmp"
        },
        "session": {
            "rows": 30,
            "cols": 100,
            "read_buffer_size": 8192,
            "max_pending_bytes": 65536,
            "close_timeout_ms": 1000
        },
        "resize": {
            "debounce_ms": 50
        },
        "logging": {
            "level": "debug"
        }
    }"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.shell.program.as_deref(), Some("/bin/sh"));
    assert_eq!(config.shell.args, vec!["-i"]);
    assert_eq!(config.default_geometry().unwrap(), Geometry { rows: 30, cols: 100 });
    assert_eq!(config.resize_debounce(), Duration::from_millis(50));
    assert_eq!(config.logging.level, "debug");

    let options = config.session_options();
    assert_eq!(options.read_buffer_size, 8192);
    assert_eq!(options.max_pending_bytes, 65536);
    assert_eq!(options.close_timeout, Duration::from_secs(1));

    let command = config.shell_command();
    assert_eq!(command.program(), "/bin/sh");
    assert_eq!(command.get_env("PS1"), Some("$ "));
}

#[test]
fn test_config_priority_cli_over_file() {
    let file = config_file(
        r#"{
        "shell": {"program": "/bin/zsh"},
        "session": {"rows": 10, "cols": 40}
    }"#,
    );

    let args = Args {
        shell: Some("/bin/sh".to_string()),
        cols: Some(132),
        log_level: Some("trace".to_string()),
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    // CLI values should win
    assert_eq!(config.shell.program.as_deref(), Some("/bin/sh"));
    assert_eq!(config.session.cols, 132);
    assert_eq!(config.logging.level, "trace");
    // File values survive where the CLI is silent
    assert_eq!(config.session.rows, 10);
}

#[test]
fn test_config_load_rejects_zero_geometry() {
    let file = config_file(r#"{"session": {"rows": 0}}"#);
    let args = Args {
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let err = Config::load(&args).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_config_load_missing_file() {
    let args = Args {
        config: Some("/nonexistent/ptymux.json".into()),
        ..Args::default()
    };

    assert!(matches!(
        Config::load(&args).unwrap_err(),
        ConfigError::Io { .. }
    ));
}

// ============================================================================
// Configuration Serialization Tests
// ============================================================================

#[test]
fn test_config_roundtrip() {
    let original = Config::default();
    let json = serde_json::to_string(&original).unwrap();
    let loaded: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(original, loaded);
}

#[test]
fn test_config_partial_deserialization() {
    // Only specify some fields, others should use defaults
    let json = r#"{"resize": {"debounce_ms": 0}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.resize.debounce_ms, 0);
    assert_eq!(config.session.rows, 24); // Default
    assert_eq!(config.session.close_timeout_ms, 2000); // Default
}
