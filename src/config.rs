//! Session configuration parsing and validation.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::{AppError, Result};

/// Environment variable that overrides `port_name` from the config file.
pub const PORT_ENV_VAR: &str = "SPIKE_REPL_PORT";

fn default_wait_timeout_ms() -> u64 {
    10_000
}

/// Statements sent to the hub right after the interrupt on connect.
///
/// Imports the modules the command builders rely on and defines
/// `run_until_complete`, which drives an awaitable to completion on the
/// hub's `runloop` so its value can be printed by a correlated call.
#[must_use]
pub fn default_prelude() -> Vec<String> {
    vec![
        "from hub import light_matrix".to_owned(),
        "import color_sensor".to_owned(),
        "import motor, motor_pair".to_owned(),
        [
            "import runloop",
            "",
            "async def async_wrapper(result, x):",
            "    result.append(await x)",
            "",
            "def run_until_complete(x):",
            "    result = []",
            "    runloop.run(async_wrapper(result, x))",
            "    return result[0][0]",
        ]
        .join("\r\n"),
    ]
}

/// REPL session configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReplConfig {
    /// Serial device the hub is attached to (`COM5`, `/dev/ttyACM0`).
    #[serde(default)]
    pub port_name: String,
    /// Upper bound for writing one statement; unset means unbounded.
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,
    /// Default deadline for correlated calls; 0 means wait forever.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Statements sent after the interrupt on every connect.
    #[serde(default = "default_prelude")]
    pub prelude: Vec<String>,
}

impl ReplConfig {
    /// Build a configuration for `port_name` with every other field defaulted.
    #[must_use]
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            send_timeout_ms: None,
            wait_timeout_ms: default_wait_timeout_ms(),
            prelude: default_prelude(),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, apply the environment
    /// override, and validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_env_override();
        config.validate()?;
        Ok(config)
    }

    /// Write timeout for a single statement, if one is configured.
    #[must_use]
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    /// Default deadline for correlated calls, `None` when disabled.
    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        (self.wait_timeout_ms > 0).then(|| Duration::from_millis(self.wait_timeout_ms))
    }

    fn apply_env_override(&mut self) {
        if let Ok(port) = env::var(PORT_ENV_VAR) {
            if !port.trim().is_empty() {
                info!(port = %port, "port_name overridden from {PORT_ENV_VAR}");
                self.port_name = port;
            }
        }
    }

    /// Check field invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `port_name` is blank or
    /// `send_timeout_ms` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(AppError::Config(format!(
                "port_name must be set in the config file or {PORT_ENV_VAR}"
            )));
        }

        if self.send_timeout_ms == Some(0) {
            return Err(AppError::Config(
                "send_timeout_ms must be greater than zero when set".into(),
            ));
        }

        Ok(())
    }
}
