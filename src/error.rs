use std::time::Duration;

use thiserror::Error;

use crate::serial::{codecs::json::FramingError, error::SerialPortError};

/// Errors that may occur while talking to a machine.
///
/// The variants up to and including [`Error::AckTimeout`] end the machine session they occurred in.
/// Nothing is retried and the stream is never resynchronized.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte stream from the controller is not a concatenation of json objects.
    #[error("Framing problem: {0}")]
    Framing(#[from] FramingError),

    /// A frame was well delimited but not a reply we can interpret.
    #[error("The controller response `{response}` could not be parsed. Problem: {problem}")]
    BadResponse {
        /// The problematic response.
        response: String,

        /// The deserialization issue.
        problem: String,
    },

    /// Reading from or writing to the link failed.
    #[error("Serial link problem: {0}")]
    Serial(SerialPortError),

    /// The controller link reached end of stream.
    #[error("Connection to the machine closed")]
    ConnectionClosed,

    /// The controller did not acknowledge a command in time.
    #[error("No acknowledgement from the machine within {0:?}")]
    AckTimeout(Duration),

    /// The machine session is no longer running, so commands cannot be accepted.
    #[error("The machine session has ended")]
    SessionEnded,

    /// This many commands are already waiting to be sent.
    #[error("The machine already has {0} commands queued")]
    CommandQueueFull(usize),

    /// A websocket request was not json of the expected shape.
    #[error("The request `{request}` could not be deserialized. Problem: {problem}")]
    BadJson {
        /// The problematic request.
        request: String,

        /// The deserialization issue.
        problem: String,
    },

    /// The web server could not be started or failed.
    #[error("Web server problem: {0}")]
    Web(String),

    /// An operator command which should not reach the machine.
    #[error("The command `{0}` is not recognized")]
    UnrecognizedCommand(String),

    /// A configuration problem.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// The serial device could not be opened.
    #[error("Could not open port at {path}, problem: {problem}")]
    OpenPort {
        /// The device path.
        path: String,

        /// What went wrong.
        problem: String,
    },
}

impl From<SerialPortError> for Error {
    fn from(error: SerialPortError) -> Self {
        match error {
            SerialPortError::Framing(framing) => Self::Framing(framing),
            other => Self::Serial(other),
        }
    }
}

impl Error {
    /// Get the problem description if this is a [`Error::BadConfig`].
    pub fn try_into_bad_config(self) -> Option<String> {
        if let Self::BadConfig(problem) = self {
            Some(problem)
        } else {
            None
        }
    }
}
