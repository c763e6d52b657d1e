use serde_json::json;

use crate::error::Error;

/// Asks the controller for a full status report.
/// Useful right after connecting, since the position is unknown until reported.
pub const REQUEST_STATUS_REPORT: &str = r#"{"sr":""}"#;

/// Canonicalize an operator's g-code line.
///
/// The line is trimmed and upper-cased.
/// `Ok(None)` means there is nothing to send.
///
/// Only `G`, `F` and `M` commands are let through.
/// Anything else is an error: the state of the machine after an unknown
/// command cannot be known, and carrying on may hurt the part and the mill.
pub fn sanitize(line: &str) -> Result<Option<String>, Error> {
    let command = line.trim().to_uppercase();

    match command.chars().next() {
        None => Ok(None),
        Some('G' | 'F' | 'M') => Ok(Some(command)),
        Some(_) => Err(Error::UnrecognizedCommand(command)),
    }
}

/// Wrap a g-code line as a TinyG json command.
pub fn wrap(gcode: &str) -> String {
    json!({ "gc": gcode }).to_string()
}
