//! Unit tests for `ReplConfig` parsing and validation.

use std::io::Write;
use std::time::Duration;

use spike_repl::config::default_prelude;
use spike_repl::{AppError, ReplConfig};

#[test]
fn parses_full_config() {
    let toml = r#"
port_name = "/dev/ttyACM0"
send_timeout_ms = 1000
wait_timeout_ms = 2500
prelude = ["import motor"]
"#;

    let config = ReplConfig::from_toml_str(toml).expect("config parses");

    assert_eq!(config.port_name, "/dev/ttyACM0");
    assert_eq!(config.send_timeout(), Some(Duration::from_millis(1000)));
    assert_eq!(config.wait_timeout(), Some(Duration::from_millis(2500)));
    assert_eq!(config.prelude, vec!["import motor".to_owned()]);
}

#[test]
fn minimal_config_uses_defaults() {
    let config = ReplConfig::from_toml_str("port_name = \"COM5\"").expect("config parses");

    assert_eq!(config.send_timeout(), None);
    assert_eq!(config.wait_timeout(), Some(Duration::from_millis(10_000)));
    assert_eq!(config.prelude, default_prelude());
}

#[test]
fn zero_wait_timeout_disables_deadline() {
    let config = ReplConfig::from_toml_str("port_name = \"COM5\"\nwait_timeout_ms = 0")
        .expect("config parses");

    assert_eq!(config.wait_timeout(), None);
}

#[test]
fn empty_prelude_is_respected() {
    let config =
        ReplConfig::from_toml_str("port_name = \"COM5\"\nprelude = []").expect("config parses");

    assert!(config.prelude.is_empty());
}

#[test]
fn zero_send_timeout_is_rejected() {
    let err = ReplConfig::from_toml_str("port_name = \"COM5\"\nsend_timeout_ms = 0")
        .expect_err("zero send timeout must fail");

    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn blank_port_is_rejected() {
    let config = ReplConfig::for_port("  ");

    let err = config.validate().expect_err("blank port must fail");

    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("port_name")));
}

#[test]
fn invalid_toml_is_config_error() {
    let err = ReplConfig::from_toml_str("port_name = ").expect_err("invalid toml");

    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "port_name = \"COM7\"\nwait_timeout_ms = 500").expect("write config");

    let config = ReplConfig::load_from_path(file.path()).expect("config loads");

    assert_eq!(config.port_name, "COM7");
    assert_eq!(config.wait_timeout(), Some(Duration::from_millis(500)));
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");

    let err = ReplConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("missing file must fail");

    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}

#[test]
fn default_prelude_defines_run_until_complete() {
    let prelude = default_prelude();

    assert!(prelude.iter().any(|s| s == "import motor, motor_pair"));
    let helper = prelude.last().expect("helper block");
    assert!(helper.contains('\n'), "helper must be sent as a multi-line block");
    assert!(helper.contains("def run_until_complete(x):"));
}
