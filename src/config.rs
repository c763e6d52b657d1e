use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error, machine::EngineOptions, pubsub::DEFAULT_SUBSCRIBER_CAPACITY,
    serial::serial_port::DEFAULT_BAUD,
};

/// How the controller is spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// TinyG json mode.
    /// Every command is held until the controller acknowledges it.
    #[default]
    Json,

    /// Lines are sent and received as opaque text,
    /// and commands are not waited on.
    Passthrough,
}

impl Protocol {
    /// The protocol for a "json mode on/off" switch.
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Passthrough
        }
    }
}

/// Settings for the websocket front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Web {
    /// The HTTP port to listen on.
    pub port: u16,
}

/// The default HTTP port of the websocket front end.
pub const DEFAULT_WEB_PORT: u16 = 9000;

impl Default for Web {
    fn default() -> Self {
        Self {
            port: DEFAULT_WEB_PORT,
        }
    }
}

/// The configuration used for running against a machine.
///
/// Any field may be omitted from a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The serial device the controller is attached to.
    /// Likely "/dev/ttyUSBx" or "COMx".
    pub device: String,

    /// Baud rate of the serial device.
    pub baud: u32,

    /// See [`Protocol`].
    pub protocol: Protocol,

    /// If set, the websocket front end is started.
    pub web: Option<Web>,

    /// How many messages each listener may lag behind before missing some.
    pub subscriber_capacity: usize,

    /// Give up on the session if a command is not acknowledged within this many milliseconds.
    /// Without it, an unresponsive controller is waited on forever.
    pub ack_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".into(),
            baud: DEFAULT_BAUD,
            protocol: Protocol::default(),
            web: None,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            ack_timeout_ms: None,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not a valid configuration: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            device: "/dev/ttyUSB0".into(),
            web: Some(Web::default()),
            ack_timeout_ms: Some(30_000),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .expect("Should serialize well")
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let path = p.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::BadConfig(format!("Could not read {path:?}: {e}")))?;

        Self::deserialize(&s)
    }

    /// The acknowledgement timeout, if any.
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration makes sense.
    pub fn validate(&self) -> Result<(), Error> {
        if self.device.trim().is_empty() {
            return Err(Error::BadConfig(
                "No serial device given, please set `device`.".into(),
            ));
        }

        if self.subscriber_capacity == 0 {
            return Err(Error::BadConfig(
                "`subscriber_capacity` must be at least 1, or listeners would never see a message."
                    .into(),
            ));
        }

        if self.ack_timeout_ms == Some(0) {
            return Err(Error::BadConfig(
                "`ack_timeout_ms` of zero would end every session on its first command. Omit it to wait forever.".into(),
            ));
        }

        Ok(())
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            protocol: config.protocol,
            subscriber_capacity: config.subscriber_capacity,
            ack_timeout: config.ack_timeout(),
        }
    }
}
