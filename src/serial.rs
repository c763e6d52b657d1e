/// Serial port related errors.
pub mod error;

/// Opening the serial device.
pub mod serial_port;

/// Codecs for encoding/decoding messages to/from wire.
pub mod codecs;

/// The message data type used for serial bytes.
pub type SerialMessageBytes = Vec<u8>;
