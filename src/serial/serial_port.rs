use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::error::Error;

/// The baud rate TinyG ships with.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Builder for an opened, asynchronous serial port.
///
/// The returned stream is handed to the machine engine as is.
/// Reconnecting after the port goes away is not attempted.
#[derive(Debug)]
pub struct SerialPortBuilder {
    baud: Option<u32>,
    path: String,
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyUSB0` on unix, and `COMx` on Windows.
    pub fn new(tty: &str) -> Self {
        Self {
            baud: None,
            path: tty.to_string(),
        }
    }

    /// Set the serial port builder's baud.
    /// Will use [`DEFAULT_BAUD`] if not set.
    pub fn set_baud(mut self, baud: u32) -> Self {
        self.baud = Some(baud);
        self
    }

    /// Open the port.
    pub fn build(self) -> Result<SerialStream, Error> {
        let baud = self.baud.unwrap_or(DEFAULT_BAUD);

        info!(path = %self.path, %baud, "Opening serial port");

        let stream = tokio_serial::new(&self.path, baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| Error::OpenPort {
                path: self.path.clone(),
                problem: e.to_string(),
            })?;

        info!("Port opened at {}", self.path);

        Ok(stream)
    }
}
