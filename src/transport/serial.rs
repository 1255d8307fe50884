//! Serial-device connector.

use std::future::Future;
use std::pin::Pin;

use tokio_serial::{DataBits, Parity, SerialPort, SerialPortBuilderExt, StopBits};
use tracing::{debug, info};

use crate::transport::{Channel, Connector};
use crate::{AppError, Result};

/// Fixed line speed of the hub REPL.
pub const BAUD_RATE: u32 = 115_200;

/// Opens the hub's serial device at 115200 8N1 with DTR asserted.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_name: String,
}

impl SerialConnector {
    /// Connector for the device at `port_name` (`COM5`, `/dev/ttyACM0`).
    #[must_use]
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Channel>> + Send + '_>> {
        Box::pin(async move {
            let mut stream = tokio_serial::new(self.port_name.as_str(), BAUD_RATE)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .open_native_async()
                .map_err(|err| {
                    AppError::Transport(format!("failed to open '{}': {err}", self.port_name))
                })?;

            // The hub only starts talking once DTR is raised.
            stream.write_data_terminal_ready(true).map_err(|err| {
                AppError::Transport(format!("failed to assert DTR on '{}': {err}", self.port_name))
            })?;
            debug!(port = %self.port_name, "serial: DTR asserted");

            info!(port = %self.port_name, baud = BAUD_RATE, "serial port opened");
            let (reader, writer) = tokio::io::split(stream);
            Ok(Channel::new(reader, writer))
        })
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}
