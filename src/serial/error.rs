use std::io;

use thiserror::Error;

use super::codecs::json::FramingError;

/// Errors raised while moving bytes to and from the serial link.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    IO(#[from] io::Error),

    /// The incoming bytes could not be split into json objects.
    #[error("Problem framing incoming bytes: {0}")]
    Framing(#[from] FramingError),
}
