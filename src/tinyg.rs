use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The positions a TinyG status report may carry.
///
/// A field is only `Some` if the controller put it in the report.
/// For example, when moving along X only X is reported,
/// since Y and Z remain the same.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Absolute X position.
    pub mpox: Option<f64>,

    /// X axis offset.
    pub ofsx: Option<f64>,

    /// Absolute Y position.
    pub mpoy: Option<f64>,

    /// Y axis offset.
    pub ofsy: Option<f64>,

    /// Absolute Z position.
    pub mpoz: Option<f64>,

    /// Z axis offset.
    pub ofsz: Option<f64>,
}

impl StatusReport {
    fn fields(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("mpox", self.mpox),
            ("ofsx", self.ofsx),
            ("mpoy", self.mpoy),
            ("ofsy", self.ofsy),
            ("mpoz", self.mpoz),
            ("ofsz", self.ofsz),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
    }

    /// True if no field was reported.
    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }
}

/// The footer TinyG appends to the reply to a command.
///
/// Seeing one means the command most recently sent has been fully answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Footer(pub Vec<i64>);

/// The shape a reply had on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A spontaneous report: `{"sr":{...}}`.
    Status(StatusReport),

    /// A report wrapped in a command reply: `{"r":{"sr":{...}}}`.
    Nested(StatusReport),

    /// Anything without a report, like `{"qr":27}`.
    Bare,
}

impl Reply {
    /// The status report, regardless of where it was found.
    pub fn report(&self) -> Option<&StatusReport> {
        match self {
            Reply::Status(report) | Reply::Nested(report) => Some(report),
            Reply::Bare => None,
        }
    }
}

#[derive(Deserialize)]
struct Body {
    sr: Option<StatusReport>,
    r: Option<Wrapped>,
    f: Option<Footer>,
}

#[derive(Deserialize)]
struct Wrapped {
    sr: Option<StatusReport>,
}

impl Body {
    /// Resolve which of the shapes this is.
    /// A top level report wins over a nested one.
    fn into_parts(self) -> (Reply, Option<Footer>) {
        let reply = match (self.sr, self.r.and_then(|wrapped| wrapped.sr)) {
            (Some(report), _) => Reply::Status(report),
            (None, Some(report)) => Reply::Nested(report),
            (None, None) => Reply::Bare,
        };

        (reply, self.f)
    }
}

/// One reply from the controller, with the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    text: String,
    reply: Reply,
    footer: Option<Footer>,
}

impl Response {
    /// Parse a single json object sent by the controller.
    ///
    /// Anything which is not a json object of the expected shape is an error.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let body: Body = serde_json::from_str(text).map_err(|e| Error::BadResponse {
            response: text.to_owned(),
            problem: e.to_string(),
        })?;

        let (reply, footer) = body.into_parts();

        Ok(Self {
            text: text.to_owned(),
            reply,
            footer,
        })
    }

    /// Parse a frame of bytes. See [`Response::parse`].
    pub fn parse_bytes(frame: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(frame).map_err(|e| Error::BadResponse {
            response: String::from_utf8_lossy(frame).into_owned(),
            problem: e.to_string(),
        })?;

        Self::parse(text)
    }

    /// A line which is not interpreted at all.
    pub fn passthrough<S: Into<String>>(line: S) -> Self {
        Self {
            text: line.into(),
            reply: Reply::Bare,
            footer: None,
        }
    }

    /// The text as received.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Borrow the [`Reply`].
    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    /// The status report, if any.
    pub fn report(&self) -> Option<&StatusReport> {
        self.reply.report()
    }

    /// The footer, if any.
    pub fn footer(&self) -> Option<&Footer> {
        self.footer.as_ref()
    }

    /// Does this response conclude the reply to a command?
    pub fn is_ack(&self) -> bool {
        self.footer.is_some()
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)?;

        if let Some(report) = self.report().filter(|report| !report.is_empty()) {
            let fields = report
                .fields()
                .map(|(name, value)| format!("{name}: {value:.3}"))
                .join("  ");
            write!(f, "\n{fields}")?;
        }

        Ok(())
    }
}
