use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::tinyg::StatusReport;

/// Where the machine is, as far as we know.
///
/// An axis is `None` until the controller has reported it,
/// which is different from a reported zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    /// Absolute X position.
    pub x: Option<f64>,

    /// Absolute Y position.
    pub y: Option<f64>,

    /// Absolute Z position.
    pub z: Option<f64>,
}

impl MachineState {
    /// Every axis unknown.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Fold a report in.
    /// Reported axes are overwritten, the others keep their value.
    pub fn apply(&mut self, report: &StatusReport) {
        if let Some(x) = report.mpox {
            self.x = Some(x);
        }
        if let Some(y) = report.mpoy {
            self.y = Some(y);
        }
        if let Some(z) = report.mpoz {
            self.z = Some(z);
        }
    }
}

impl Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let axis = |value: Option<f64>| match value {
            Some(value) => format!("{value:.3}"),
            None => "?".to_owned(),
        };

        write!(
            f,
            "[X: {}, Y: {}, Z: {}]",
            axis(self.x),
            axis(self.y),
            axis(self.z)
        )
    }
}

/// A message from the connected machine to the listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Output from the machine, for a human operator to interpret.
    Raw(String),

    /// The machine position after folding in the latest report.
    State(MachineState),
}

impl Message {
    /// The wire form of this message.
    pub fn envelope(&self) -> Envelope {
        match self {
            Message::Raw(raw) => Envelope {
                raw: Some(raw.clone()),
                state: None,
            },
            Message::State(state) => Envelope {
                raw: None,
                state: Some(*state),
            },
        }
    }

    /// Borrow as the raw variant.
    pub fn as_raw(&self) -> Option<&str> {
        if let Self::Raw(raw) = self {
            Some(raw)
        } else {
            None
        }
    }

    /// Borrow as the state variant.
    pub fn as_state(&self) -> Option<&MachineState> {
        if let Self::State(state) = self {
            Some(state)
        } else {
            None
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Raw(raw) => write!(f, "{raw}"),
            Message::State(state) => write!(f, "State: {state}"),
        }
    }
}

/// How a [`Message`] is serialized for remote listeners.
///
/// At most one of the fields is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// See [`Message::Raw`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    /// See [`Message::State`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MachineState>,
}

impl Envelope {
    /// Serialize as a json string.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("Serialize should work")
    }
}

impl From<Envelope> for Option<Message> {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope { raw: Some(raw), .. } => Some(Message::Raw(raw)),
            Envelope {
                state: Some(state), ..
            } => Some(Message::State(state)),
            _ => None,
        }
    }
}
