//! Unit tests for `AppError` display format.

use spike_repl::AppError;

#[test]
fn display_uses_kind_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Transport("x".into()), "transport: x"),
        (AppError::Timeout("x".into()), "timeout: x"),
        (AppError::InvalidState("x".into()), "invalid state: x"),
        (AppError::CapacityExceeded("x".into()), "capacity exceeded: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Protocol("x".into()), "protocol: x"),
        (AppError::Io("x".into()), "io: x"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_errors_become_config_errors() {
    let err: AppError = toml::from_str::<toml::Value>("not = [valid")
        .expect_err("invalid toml")
        .into();

    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn io_errors_become_io_errors() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();

    assert_eq!(err.to_string(), "io: gone");
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
    assert_error(&AppError::Timeout("slow".into()));
}
